//! The generic input: listener lifecycle and the read loop.
//!
//! # State
//! ```text
//! Unconnected --connect--> Listening --close--> Closed
//!      |                                          ^
//!      +------------------close-------------------+
//! ```
//!
//! # Design Decisions
//! - TLS material is loaded before binding, so a certificate error never
//!   leaves a socket behind
//! - One `Shutdown` per input; `close`, a signal handler holding
//!   [`Input::shutdown_handle`] and `Drop` all trigger the same token
//! - The hand-off channel is bounded; a slow reader stalls the acceptor

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::input::{AckHandle, InputError, Protocol};
use crate::lifecycle::{CancelCause, CancelToken, Shutdown};
use crate::net::{Listener, ListenerError, TlsContext};

struct Server<U> {
    units: mpsc::Receiver<U>,
    task: JoinHandle<()>,
    local_addr: SocketAddr,
}

enum State<U> {
    Unconnected,
    Listening(Server<U>),
    Closed,
}

/// A protocol input driven by a pull loop.
pub struct Input<P: Protocol> {
    protocol: Arc<P>,
    shutdown: Shutdown,
    state: State<P::Unit>,
}

impl<P: Protocol> Input<P> {
    /// Wrap a protocol. Nothing is bound until [`connect`](Self::connect).
    pub fn with_protocol(protocol: P) -> Self {
        Self {
            protocol: Arc::new(protocol),
            shutdown: Shutdown::new(),
            state: State::Unconnected,
        }
    }

    /// Load TLS material, bind the listener and start the background
    /// acceptor. Returns the bound address.
    ///
    /// Fails with [`InputError::AlreadyConnected`] while listening and with
    /// [`InputError::Closed`] once the input was closed or shut down.
    pub async fn connect(&mut self) -> Result<SocketAddr, InputError> {
        match self.state {
            State::Unconnected => {}
            State::Listening(_) => return Err(InputError::AlreadyConnected),
            State::Closed => return Err(InputError::Closed),
        }
        if self.shutdown.is_triggered() {
            self.state = State::Closed;
            return Err(InputError::Closed);
        }

        let config = self.protocol.listener();
        let transport = config.transport;
        if !P::TRANSPORTS.contains(&transport) || (config.tls.is_some() && !P::supports_tls(transport)) {
            return Err(InputError::UnsupportedTransport {
                protocol: P::NAME,
                transport,
                tls: config.tls.is_some(),
            });
        }

        let tls = config.tls.as_ref().map(TlsContext::build).transpose()?;
        let listener = Listener::bind(&config.bind, transport).await?;
        let local_addr = listener.local_addr().map_err(|source| ListenerError::Bind {
            address: config.bind.clone(),
            source,
        })?;

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let task = tokio::spawn(Arc::clone(&self.protocol).serve(
            listener,
            tls,
            tx,
            self.shutdown.clone(),
        ));

        tracing::info!(
            protocol = P::NAME,
            address = %local_addr,
            transport = %transport,
            tls = config.tls.is_some(),
            client_auth = config.tls.as_ref().is_some_and(|t| t.require_client_auth),
            "Input listening"
        );

        self.state = State::Listening(Server {
            units: rx,
            task,
            local_addr,
        });
        Ok(local_addr)
    }

    /// Wait for the next unit, or for `cancel` to fire.
    ///
    /// Cancellation only ends this call; a unit that arrives afterwards is
    /// returned by the next one. Once a unit is dequeued it is always
    /// returned.
    pub async fn recv(&mut self, cancel: &CancelToken) -> Result<(P::Output, AckHandle), InputError> {
        let State::Listening(server) = &mut self.state else {
            return Err(InputError::NotConnected);
        };

        let unit = tokio::select! {
            unit = server.units.recv() => unit.ok_or(InputError::Cancelled(CancelCause::ListenerClosed))?,
            cause = cancel.cancelled() => return Err(InputError::Cancelled(cause)),
            _ = self.shutdown.triggered() => {
                return Err(InputError::Cancelled(CancelCause::ListenerClosed))
            }
        };

        Ok(self.protocol.deliver(unit))
    }

    /// Stop the acceptor, close every connection and release the socket.
    ///
    /// Idempotent; closing an unconnected input just marks it closed.
    pub async fn close(&mut self) -> Result<(), InputError> {
        self.shutdown.trigger();
        if let State::Listening(server) = std::mem::replace(&mut self.state, State::Closed) {
            let Server {
                units,
                task,
                local_addr,
            } = server;
            drop(units);
            if let Err(e) = task.await {
                if e.is_panic() {
                    tracing::error!(protocol = P::NAME, error = %e, "Input task panicked");
                }
            }
            tracing::info!(protocol = P::NAME, address = %local_addr, "Input closed");
        }
        Ok(())
    }

    /// Address of the bound listener while listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.state {
            State::Listening(server) => Some(server.local_addr),
            _ => None,
        }
    }

    pub fn is_listening(&self) -> bool {
        matches!(self.state, State::Listening(_)) && !self.shutdown.is_triggered()
    }

    /// The shutdown token of this input.
    ///
    /// Triggering it from another task (e.g. a signal handler) stops the
    /// listener and unblocks a parked read with `ListenerClosed`; the owner
    /// then calls [`close`](Self::close) to finish teardown.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }
}

impl<P: Protocol> Drop for Input<P> {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

impl<P: Protocol> std::fmt::Debug for Input<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            State::Unconnected => "unconnected",
            State::Listening(_) => "listening",
            State::Closed => "closed",
        };
        f.debug_struct("Input")
            .field("protocol", &P::NAME)
            .field("state", &state)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
