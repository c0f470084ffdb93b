//! Syslog wire handling: stream framing and message parsing.

pub mod framing;
pub mod parser;

pub use framing::{strip_octet_prefix, FramingError, SyslogFramer};
pub use parser::{parse, ParseError};
