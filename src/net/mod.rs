//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! connect
//!     → tls.rs (build immutable TLS context, when configured)
//!     → listener.rs (bind TCP/UDP)
//!     → listener.rs accept_loop (TCP: accept, TLS handshake per connection)
//!     → connection.rs (id + active tracking)
//!     → Hand off to the protocol handler
//! ```
//!
//! # Design Decisions
//! - Handshakes run in the connection task, never on the accept path
//! - A failed handshake closes that connection only
//! - Shutdown aborts every connection task before the socket is dropped

pub mod connection;
pub mod listener;
pub mod tls;

pub use listener::{accept_loop, Accepted, BoxedStream, Listener, ListenerError};
pub use tls::{TlsContext, TlsError};
