//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → input.rs (LumberjackConfig / SyslogConfig, validated, immutable)
//!     → moved into exactly one input
//! ```
//!
//! # Design Decisions
//! - Config is immutable once built; a change means a new input
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod input;
pub mod loader;
pub mod schema;
pub mod validation;

pub use input::{ListenerConfig, LumberjackConfig, SyslogConfig, TlsMaterials};
pub use loader::{load_config, ConfigError};
pub use schema::{AckMode, InputsConfig, ObservabilityConfig, SyslogFormat, Transport};
