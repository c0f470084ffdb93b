//! Errors surfaced by inputs to their caller.

use crate::config::{ConfigError, Transport};
use crate::lifecycle::CancelCause;
use crate::net::{ListenerError, TlsError};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Key, certificate or CA material could not be loaded.
    #[error("certificate error: {0}")]
    Certificate(#[from] TlsError),

    #[error(transparent)]
    Bind(#[from] ListenerError),

    /// A read was unblocked without a unit. Retrying is safe.
    #[error("read cancelled: {0}")]
    Cancelled(CancelCause),

    #[error("input is not connected")]
    NotConnected,

    #[error("input is already connected")]
    AlreadyConnected,

    #[error("input is closed")]
    Closed,

    #[error("{protocol} input cannot listen on {transport}{}", with_tls(.tls))]
    UnsupportedTransport {
        protocol: &'static str,
        transport: Transport,
        tls: bool,
    },

    /// The acknowledgment could not reach its connection.
    #[error("acknowledgment not delivered: connection is gone")]
    Ack,
}

fn with_tls(tls: &bool) -> &'static str {
    if *tls {
        " with TLS"
    } else {
        ""
    }
}

impl InputError {
    /// Whether the error only ended one read and the input is still usable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            InputError::Cancelled(CancelCause::Caller | CancelCause::DeadlineExceeded)
        )
    }
}
