//! Protocol-server inputs for log ingestion.
//!
//! Two inputs share one listener lifecycle: a lumberjack (v2) batch input
//! and a syslog input (UDP, TCP or TLS). Each is driven by a pull loop:
//! `connect`, then `read_batch` / `read` until done, then `close`.

pub mod codec;
pub mod config;
pub mod input;
pub mod lifecycle;
pub mod net;
pub mod observability;

pub use config::{load_config, InputsConfig, LumberjackConfig, SyslogConfig};
pub use input::{AckHandle, Input, InputError, LumberjackInput, Record, SyslogInput};
pub use lifecycle::{CancelCause, CancelToken, Shutdown};
