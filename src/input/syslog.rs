//! Syslog input over UDP, TCP or TLS.
//!
//! # Data Flow
//! ```text
//! UDP datagram ──────────────┐
//! TCP/TLS stream → framing ──┴→ parser → fields + client → hand-off channel → read
//! ```
//!
//! Syslog has no protocol-level acknowledgment, so every handle returned
//! by [`SyslogInput::read`] is a no-op. Messages that fail to parse are
//! logged, counted and dropped; the connection stays open.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::{Map, Value};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;

use crate::codec::syslog::{self as wire, strip_octet_prefix, SyslogFramer};
use crate::config::{ListenerConfig, SyslogConfig, SyslogFormat, Transport};
use crate::input::protocol::enqueue;
use crate::input::{AckHandle, Input, InputError, Protocol, Record};
use crate::lifecycle::{CancelToken, Shutdown};
use crate::net::{accept_loop, Accepted, Listener, TlsContext};
use crate::observability::metrics;

/// Parsed fields of one message.
pub type SyslogFields = Map<String, Value>;

/// Syslog wire protocol.
#[derive(Debug, Clone)]
pub struct SyslogProtocol {
    config: SyslogConfig,
}

/// Syslog input.
pub type SyslogInput = Input<SyslogProtocol>;

impl SyslogProtocol {
    pub fn new(config: SyslogConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SyslogConfig {
        &self.config
    }

    /// Parse one framed message and tag it with its sender.
    fn parse(&self, raw: &[u8], client: SocketAddr) -> Option<SyslogFields> {
        match wire::parse(self.config.format, raw) {
            Ok(mut fields) => {
                fields.insert("client".into(), Value::String(client.to_string()));
                Some(fields)
            }
            Err(e) => {
                tracing::debug!(
                    peer_addr = %client,
                    error = %e,
                    raw = %String::from_utf8_lossy(raw),
                    "Dropping unparseable syslog message"
                );
                metrics::record_decode_error(Self::NAME);
                None
            }
        }
    }

    async fn receive_datagrams(&self, socket: UdpSocket, units: mpsc::Sender<SyslogFields>, shutdown: Shutdown) {
        let max = self.config.max_message_size;
        // One spare byte tells a full-size datagram from a truncated one.
        let mut buf = vec![0u8; max + 1];
        let strip_prefix = matches!(self.config.format, SyslogFormat::Rfc6587 | SyslogFormat::Automatic);

        loop {
            let (len, peer_addr) = tokio::select! {
                _ = shutdown.triggered() => break,
                received = socket.recv_from(&mut buf) => match received {
                    Ok(received) => received,
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to receive datagram");
                        continue;
                    }
                },
            };

            if len > max {
                tracing::warn!(peer_addr = %peer_addr, limit = max, "Dropping oversized datagram");
                metrics::record_decode_error(Self::NAME);
                continue;
            }

            let datagram = &buf[..len];
            let payload = if strip_prefix {
                strip_octet_prefix(datagram)
            } else {
                datagram
            };
            let Some(fields) = self.parse(payload, peer_addr) else {
                continue;
            };
            if !enqueue(&units, fields, &shutdown).await {
                break;
            }
            metrics::record_unit(Self::NAME);
        }

        drop(socket);
        tracing::info!(protocol = Self::NAME, "Listener stopped");
    }

    async fn handle_stream(self: Arc<Self>, conn: Accepted, units: mpsc::Sender<SyslogFields>, shutdown: Shutdown) {
        let Accepted {
            stream,
            peer_addr,
            guard,
        } = conn;
        let connection_id = guard.id();
        let framer = SyslogFramer::new(self.config.format, self.config.max_message_size);
        let mut frames = FramedRead::new(stream, framer);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!(
                        peer_addr = %peer_addr,
                        connection_id = %connection_id,
                        error = %e,
                        "Dropping connection after framing error"
                    );
                    metrics::record_decode_error(Self::NAME);
                    return;
                }
            };
            let Some(fields) = self.parse(&frame, peer_addr) else {
                continue;
            };
            if !enqueue(&units, fields, &shutdown).await {
                return;
            }
            metrics::record_unit(Self::NAME);
        }
        tracing::debug!(peer_addr = %peer_addr, connection_id = %connection_id, "Connection closed by peer");
    }
}

impl Protocol for SyslogProtocol {
    type Unit = SyslogFields;
    type Output = Record;

    const NAME: &'static str = "syslog";
    const TRANSPORTS: &'static [Transport] = &[Transport::Udp, Transport::Tcp];

    fn listener(&self) -> &ListenerConfig {
        &self.config.listener
    }

    fn serve(
        self: Arc<Self>,
        listener: Listener,
        tls: Option<TlsContext>,
        units: mpsc::Sender<SyslogFields>,
        shutdown: Shutdown,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        async move {
            match listener {
                Listener::Udp(socket) => self.receive_datagrams(socket, units, shutdown).await,
                Listener::Tcp(listener) => {
                    let connection_shutdown = shutdown.clone();
                    accept_loop(listener, tls, Self::NAME, shutdown, move |conn| {
                        Arc::clone(&self).handle_stream(conn, units.clone(), connection_shutdown.clone())
                    })
                    .await;
                }
            }
        }
    }

    fn deliver(&self, fields: SyslogFields) -> (Record, AckHandle) {
        metrics::record_records(Self::NAME, 1);
        (Record::new(Value::Object(fields)), AckHandle::noop())
    }
}

impl Input<SyslogProtocol> {
    /// Create an unconnected syslog input.
    pub fn new(config: SyslogConfig) -> Self {
        Self::with_protocol(SyslogProtocol::new(config))
    }

    /// Read the next message as a single record.
    pub async fn read(&mut self, cancel: &CancelToken) -> Result<(Record, AckHandle), InputError> {
        self.recv(cancel).await
    }
}
