//! Lumberjack (v2) batch input.
//!
//! # Data Flow
//! ```text
//! TLS connection
//!     → LumberjackCodec (frames → window)
//!     → hand-off channel (Batch + ack channel)
//!     → read_batch (records + AckHandle)
//!     → ACK(last seq) written back on the connection
//! ```
//!
//! While a window waits for channel space or for its commit, the
//! connection sends keepalive ACKs (sequence 0) so the shipper does not
//! time out. A connection handles one window at a time.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::codec::Framed;

use crate::codec::lumberjack::{Ack, DecodeError, LumberjackCodec, Window};
use crate::config::{AckMode, ListenerConfig, LumberjackConfig, Transport};
use crate::input::ack::AckOutcome;
use crate::input::protocol::enqueue;
use crate::input::record::adapt_batch;
use crate::input::{AckHandle, Input, InputError, Protocol, Record};
use crate::lifecycle::{CancelToken, Shutdown};
use crate::net::{accept_loop, Accepted, BoxedStream, Listener, TlsContext};
use crate::observability::metrics;

/// `interval` rejects a zero period.
const MIN_KEEPALIVE: Duration = Duration::from_millis(10);

/// A completed window waiting to be read.
#[derive(Debug)]
pub struct Batch {
    events: Vec<Value>,
    ack: AckHandle,
}

/// Lumberjack wire protocol.
#[derive(Debug, Clone)]
pub struct LumberjackProtocol {
    config: LumberjackConfig,
}

/// Lumberjack input.
pub type LumberjackInput = Input<LumberjackProtocol>;

impl LumberjackProtocol {
    pub fn new(config: LumberjackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LumberjackConfig {
        &self.config
    }

    async fn handle_connection(self: Arc<Self>, conn: Accepted, units: mpsc::Sender<Batch>, shutdown: Shutdown) {
        let Accepted {
            stream,
            peer_addr,
            guard,
        } = conn;
        let connection_id = guard.id();
        let mut framed = Framed::new(stream, LumberjackCodec::new());

        loop {
            let window = match tokio::time::timeout(self.config.read_timeout, framed.next()).await {
                Ok(Some(Ok(window))) => window,
                Ok(Some(Err(e))) => {
                    tracing::warn!(
                        peer_addr = %peer_addr,
                        connection_id = %connection_id,
                        error = %e,
                        "Dropping connection after decode error"
                    );
                    metrics::record_decode_error(Self::NAME);
                    break;
                }
                Ok(None) => {
                    tracing::debug!(peer_addr = %peer_addr, connection_id = %connection_id, "Connection closed by peer");
                    break;
                }
                Err(_) => {
                    tracing::debug!(peer_addr = %peer_addr, connection_id = %connection_id, "Connection idle, closing");
                    break;
                }
            };

            tracing::debug!(
                peer_addr = %peer_addr,
                connection_id = %connection_id,
                events = window.events.len(),
                last_sequence = window.last_sequence,
                "Window received"
            );

            match self.hand_off(&mut framed, window, &units, &shutdown).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(
                        peer_addr = %peer_addr,
                        connection_id = %connection_id,
                        "Window not acknowledged, closing connection"
                    );
                    break;
                }
                Err(e) => {
                    tracing::debug!(
                        peer_addr = %peer_addr,
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to write ACK"
                    );
                    break;
                }
            }
        }
    }

    /// Queue one window and wait until it is committed, sending keepalives
    /// meanwhile. Returns `Ok(false)` when it will never be acknowledged.
    async fn hand_off(
        &self,
        framed: &mut Framed<BoxedStream, LumberjackCodec>,
        window: Window,
        units: &mpsc::Sender<Batch>,
        shutdown: &Shutdown,
    ) -> Result<bool, DecodeError> {
        let Window {
            last_sequence,
            events,
        } = window;
        let (ack, mut outcome) = AckHandle::channel();

        let keepalive = self.config.keepalive.max(MIN_KEEPALIVE);
        let mut ticker = interval_at(Instant::now() + keepalive, keepalive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let queued = enqueue(units, Batch { events, ack }, shutdown);
        tokio::pin!(queued);
        loop {
            tokio::select! {
                sent = &mut queued => {
                    if !sent {
                        return Ok(false);
                    }
                    metrics::record_unit(Self::NAME);
                    break;
                }
                _ = ticker.tick() => framed.send(Ack::KEEPALIVE).await?,
            }
        }

        loop {
            tokio::select! {
                result = &mut outcome => {
                    return match result {
                        Ok(AckOutcome::Commit) => {
                            framed.send(Ack(last_sequence)).await?;
                            Ok(true)
                        }
                        Ok(AckOutcome::Reject) | Err(_) => Ok(false),
                    };
                }
                _ = ticker.tick() => framed.send(Ack::KEEPALIVE).await?,
            }
        }
    }
}

impl Protocol for LumberjackProtocol {
    type Unit = Batch;
    type Output = Vec<Record>;

    const NAME: &'static str = "lumberjack";
    const TRANSPORTS: &'static [Transport] = &[Transport::Tcp];

    fn listener(&self) -> &ListenerConfig {
        &self.config.listener
    }

    fn serve(
        self: Arc<Self>,
        listener: Listener,
        tls: Option<TlsContext>,
        units: mpsc::Sender<Batch>,
        shutdown: Shutdown,
    ) -> impl std::future::Future<Output = ()> + Send + 'static {
        async move {
            let Listener::Tcp(listener) = listener else {
                tracing::error!("Lumberjack requires a TCP listener");
                return;
            };
            let connection_shutdown = shutdown.clone();
            accept_loop(listener, tls, Self::NAME, shutdown, move |conn| {
                Arc::clone(&self).handle_connection(conn, units.clone(), connection_shutdown.clone())
            })
            .await;
        }
    }

    fn deliver(&self, batch: Batch) -> (Vec<Record>, AckHandle) {
        let Batch { events, ack } = batch;
        metrics::record_records(Self::NAME, events.len());
        let records = adapt_batch(events);

        match self.config.ack_mode {
            AckMode::OnCommit => (records, ack),
            AckMode::Immediate => {
                // At-most-once: the shipper is acknowledged before the caller
                // has processed anything.
                if let Err(e) = ack.commit() {
                    tracing::warn!(error = %e, "Batch delivered but its ACK could not be sent");
                }
                (records, AckHandle::noop())
            }
        }
    }
}

impl Input<LumberjackProtocol> {
    /// Create an unconnected lumberjack input.
    pub fn new(config: LumberjackConfig) -> Self {
        Self::with_protocol(LumberjackProtocol::new(config))
    }

    /// Read the next batch as records, in the order the shipper sent them.
    ///
    /// In `immediate` ack mode the batch is acknowledged to the shipper
    /// before this returns and the handle is a no-op. In `on_commit` mode
    /// the shipper is acknowledged when the handle is committed.
    pub async fn read_batch(&mut self, cancel: &CancelToken) -> Result<(Vec<Record>, AckHandle), InputError> {
        self.recv(cancel).await
    }
}
