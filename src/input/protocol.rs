//! The seam between the generic input and a wire protocol.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{ListenerConfig, Transport};
use crate::input::AckHandle;
use crate::lifecycle::Shutdown;
use crate::net::{Listener, TlsContext};

/// A wire protocol an [`Input`](crate::input::Input) can serve.
///
/// The input owns the listener lifecycle (TLS, bind, hand-off channel,
/// shutdown); the protocol owns what happens on the socket and how a
/// decoded unit turns into caller output.
pub trait Protocol: Send + Sync + Sized + 'static {
    /// What the background task hands to the reader.
    type Unit: Send + 'static;

    /// What a read returns.
    type Output;

    /// Name used in logs and metric labels.
    const NAME: &'static str;

    /// Transports this protocol can listen on.
    const TRANSPORTS: &'static [Transport];

    /// Whether a TLS-wrapped listener is supported on `transport`.
    fn supports_tls(transport: Transport) -> bool {
        transport == Transport::Tcp
    }

    fn listener(&self) -> &ListenerConfig;

    /// Accept and decode until `shutdown` fires, pushing completed units
    /// into `units`. Returning releases the socket.
    fn serve(
        self: Arc<Self>,
        listener: Listener,
        tls: Option<TlsContext>,
        units: mpsc::Sender<Self::Unit>,
        shutdown: Shutdown,
    ) -> impl Future<Output = ()> + Send + 'static;

    /// Apply acknowledgment semantics to a dequeued unit and adapt it.
    ///
    /// Never blocks and never drops the unit.
    fn deliver(&self, unit: Self::Unit) -> (Self::Output, AckHandle);
}

/// Push `unit` into the hand-off channel, giving up if `shutdown` fires
/// while the channel is full. Returns `false` when the input is gone.
pub(crate) async fn enqueue<U>(units: &mpsc::Sender<U>, unit: U, shutdown: &Shutdown) -> bool {
    tokio::select! {
        sent = units.send(unit) => sent.is_ok(),
        _ = shutdown.triggered() => false,
    }
}
