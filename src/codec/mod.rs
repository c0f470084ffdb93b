//! Wire codecs.
//!
//! # Data Flow
//! ```text
//! accepted connection
//!     → lumberjack.rs (frames → completed windows, ACK frames back)
//!     → syslog/framing.rs (stream → one message per frame)
//!     → syslog/parser.rs (message → structured fields)
//! ```
//!
//! # Design Decisions
//! - Stream codecs implement `tokio_util::codec` so connections run on `Framed`
//! - A decode error ends that connection only

pub mod lumberjack;
pub mod syslog;
