//! Listener binding and the shared TCP accept loop.
//!
//! # Responsibilities
//! - Bind TCP or UDP at the configured address
//! - Accept incoming TCP connections until shutdown
//! - Run the optional TLS handshake per connection, off the accept path
//! - Graceful handling of accept and handshake errors
//!
//! A failed bind leaves nothing behind: no socket, no task.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;

use crate::config::Transport;
use crate::lifecycle::Shutdown;
use crate::net::connection::{ConnectionGuard, ConnectionId, ConnectionTracker};
use crate::net::tls::TlsContext;
use crate::observability::metrics;

/// Upper bound on a single TLS handshake.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. EMFILE) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind {
        address: String,
        source: std::io::Error,
    },
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind { address, source } => {
                write!(f, "Failed to bind {}: {}", address, source)
            }
        }
    }
}

impl std::error::Error for ListenerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ListenerError::Bind { source, .. } => Some(source),
        }
    }
}

/// A bound, not yet serving, listener.
#[derive(Debug)]
pub enum Listener {
    Tcp(TcpListener),
    Udp(UdpSocket),
}

impl Listener {
    /// Bind `address` on `transport`.
    ///
    /// A bare `:port` binds all interfaces.
    pub async fn bind(address: &str, transport: Transport) -> Result<Self, ListenerError> {
        let address = normalize_bind(address);
        let bind_err = |source| ListenerError::Bind {
            address: address.clone(),
            source,
        };

        let listener = match transport {
            Transport::Tcp => Listener::Tcp(TcpListener::bind(&address).await.map_err(bind_err)?),
            Transport::Udp => Listener::Udp(UdpSocket::bind(&address).await.map_err(bind_err)?),
        };

        let local_addr = listener.local_addr().map_err(bind_err)?;
        tracing::info!(
            address = %local_addr,
            transport = %transport,
            "Listener bound"
        );
        Ok(listener)
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        match self {
            Listener::Tcp(listener) => listener.local_addr(),
            Listener::Udp(socket) => socket.local_addr(),
        }
    }

    /// Transport of the bound socket.
    pub fn transport(&self) -> Transport {
        match self {
            Listener::Tcp(_) => Transport::Tcp,
            Listener::Udp(_) => Transport::Udp,
        }
    }
}

fn normalize_bind(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// Byte stream of an accepted connection, plain or TLS.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

/// Boxed connection stream handed to protocol handlers.
pub type BoxedStream = Box<dyn IoStream>;

/// An accepted (and, with TLS, authenticated) connection.
pub struct Accepted {
    pub stream: BoxedStream,
    pub peer_addr: SocketAddr,
    /// Held for the connection's lifetime.
    pub guard: ConnectionGuard,
}

/// Accept connections until `shutdown` fires, running `handler` for each.
///
/// Connection tasks are owned by this loop and aborted when it exits, so
/// returning means every connection and the socket itself are released.
pub async fn accept_loop<F, Fut>(
    listener: TcpListener,
    tls: Option<TlsContext>,
    protocol: &'static str,
    shutdown: Shutdown,
    handler: F,
) where
    F: Fn(Accepted) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let tracker = ConnectionTracker::new(protocol);
    let acceptor = tls.as_ref().map(TlsContext::acceptor);
    let handler = Arc::new(handler);
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.triggered() => break,
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    if e.is_panic() {
                        tracing::error!(protocol, error = %e, "Connection task panicked");
                    }
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    let guard = tracker.track();
                    tracing::debug!(
                        protocol,
                        peer_addr = %peer_addr,
                        connection_id = %guard.id(),
                        active = tracker.active_count(),
                        "Connection accepted"
                    );

                    let acceptor = acceptor.clone();
                    let handler = Arc::clone(&handler);
                    connections.spawn(async move {
                        let stream = match handshake(acceptor, stream, peer_addr, guard.id(), protocol).await {
                            Some(stream) => stream,
                            None => return,
                        };
                        handler(Accepted { stream, peer_addr, guard }).await;
                    });
                }
                Err(e) => {
                    tracing::warn!(protocol, error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }

    connections.shutdown().await;
    drop(listener);
    tracing::info!(protocol, "Listener stopped");
}

async fn handshake(
    acceptor: Option<TlsAcceptor>,
    stream: TcpStream,
    peer_addr: SocketAddr,
    connection_id: ConnectionId,
    protocol: &'static str,
) -> Option<BoxedStream> {
    let Some(acceptor) = acceptor else {
        return Some(Box::new(stream));
    };

    match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls_stream)) => Some(Box::new(tls_stream)),
        Ok(Err(e)) => {
            tracing::warn!(
                protocol,
                peer_addr = %peer_addr,
                connection_id = %connection_id,
                error = %e,
                "TLS handshake failed"
            );
            metrics::record_handshake_failure(protocol);
            None
        }
        Err(_) => {
            tracing::warn!(
                protocol,
                peer_addr = %peer_addr,
                connection_id = %connection_id,
                "TLS handshake timed out"
            );
            metrics::record_handshake_failure(protocol);
            None
        }
    }
}
