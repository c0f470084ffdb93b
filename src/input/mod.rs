//! Protocol inputs.
//!
//! # Data Flow
//! ```text
//! connect()
//!     → net::tls (TLS context, when configured)
//!     → net::listener (bind)
//!     → Protocol::serve (background task: accept, decode, enqueue)
//!     → hand-off channel (bounded)
//!     → read / read_batch (dequeue → ack semantics → records)
//! close()
//!     → shutdown trigger → acceptor and connections stop → socket released
//! ```
//!
//! # Design Decisions
//! - One generic `Input<P>` carries the lifecycle; lumberjack and syslog
//!   only differ in their `Protocol` impl
//! - A read races the channel against the caller's token; the channel
//!   receive is cancel-safe, so a cancelled read loses nothing

pub mod ack;
pub mod error;
pub mod lumberjack;
pub mod protocol;
pub mod record;
pub mod server;
pub mod syslog;

pub use ack::{AckHandle, AckOutcome};
pub use error::InputError;
pub use lumberjack::{LumberjackInput, LumberjackProtocol};
pub use protocol::Protocol;
pub use record::Record;
pub use server::Input;
pub use syslog::{SyslogInput, SyslogProtocol};
