//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Input::close() or signal → Shutdown::trigger()
//!     → acceptor stops, connections drop, socket released
//!     → parked reader returns Cancelled(ListenerClosed)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger the owning input's Shutdown
//!
//! Cancellation (cancel.rs):
//!     CancelToken (caller or deadline) → unblocks one read only
//! ```
//!
//! # Design Decisions
//! - One owned shutdown context per input, never process-wide
//! - Signals converge on the same trigger as an explicit close
//! - Read cancellation never stops the listener

pub mod cancel;
pub mod shutdown;
pub mod signals;

pub use cancel::{CancelCause, CancelToken};
pub use shutdown::Shutdown;
