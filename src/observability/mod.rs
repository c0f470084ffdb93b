//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Acceptors, connections and readers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stderr; stdout carries records)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields (peer_addr, connection_id, protocol) on every event
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
