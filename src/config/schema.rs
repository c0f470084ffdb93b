//! Configuration schema definitions.
//!
//! This module defines the on-disk configuration structure for the inputs.
//! All types derive Serde traits for deserialization from config files.
//! The original camelCase option names are accepted as aliases.

use serde::{Deserialize, Serialize};

/// Default hand-off channel capacity shared by both inputs.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Root configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct InputsConfig {
    /// Lumberjack (batch log-shipper) input, if configured.
    pub lumberjack: Option<LumberjackSection>,

    /// Syslog input, if configured.
    pub syslog: Option<SyslogSection>,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Transport used by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum Transport {
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[default]
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transport::Tcp => write!(f, "TCP"),
            Transport::Udp => write!(f, "UDP"),
        }
    }
}

/// Syslog framing/parsing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
pub enum SyslogFormat {
    /// Detect framing and message format per frame.
    #[default]
    #[serde(alias = "automatic", alias = "auto")]
    Automatic,
    /// BSD syslog, newline framed.
    #[serde(rename = "RFC3164", alias = "rfc3164")]
    Rfc3164,
    /// IETF syslog, newline framed.
    #[serde(rename = "RFC5424", alias = "rfc5424")]
    Rfc5424,
    /// IETF syslog with octet-counting framing.
    #[serde(rename = "RFC6587", alias = "rfc6587")]
    Rfc6587,
}

/// When a lumberjack window is acknowledged to the shipper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AckMode {
    /// Acknowledge as soon as the batch is dequeued by the reader.
    /// At-most-once: a crash before processing loses the batch.
    #[default]
    Immediate,
    /// Acknowledge only when the caller invokes the batch's `AckHandle`.
    OnCommit,
}

/// Lumberjack input section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LumberjackSection {
    /// Bind address (e.g., "0.0.0.0:5044").
    pub bind: String,

    /// Server certificate chain (PEM). TLS is mandatory for this input.
    #[serde(alias = "svrCert")]
    pub svr_cert: String,

    /// Server private key (PEM).
    #[serde(alias = "privKey")]
    pub priv_key: String,

    /// CA bundle used to verify client certificates.
    #[serde(alias = "caCert")]
    pub ca_cert: Option<String>,

    /// Require and verify a client certificate.
    #[serde(alias = "cliAuth")]
    pub cli_auth: bool,

    /// Bound of the hand-off channel between acceptor and reader.
    pub channel_capacity: usize,

    /// Protocol acknowledgment policy.
    pub ack_mode: AckMode,

    /// Keepalive interval while a window awaits commit, in seconds.
    pub keepalive_secs: u64,

    /// Idle connection timeout in seconds.
    pub read_timeout_secs: u64,
}

impl Default for LumberjackSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5044".to_string(),
            svr_cert: String::new(),
            priv_key: String::new(),
            ca_cert: None,
            cli_auth: false,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            ack_mode: AckMode::Immediate,
            keepalive_secs: 3,
            read_timeout_secs: 30,
        }
    }
}

/// Syslog input section.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SyslogSection {
    /// Bind address (e.g., "0.0.0.0:514").
    pub bind: String,

    /// Transport: UDP or TCP.
    pub protocol: Transport,

    /// Wrap the TCP listener in TLS.
    #[serde(alias = "useTLS", alias = "use_TLS")]
    pub use_tls: bool,

    /// Server certificate chain (PEM), required with `use_tls`.
    #[serde(alias = "svrCert")]
    pub svr_cert: String,

    /// Server private key (PEM), required with `use_tls`.
    #[serde(alias = "privKey")]
    pub priv_key: String,

    /// CA bundle used to verify client certificates.
    #[serde(alias = "caCert")]
    pub ca_cert: Option<String>,

    /// Require and verify a client certificate.
    #[serde(alias = "cliAuth")]
    pub cli_auth: bool,

    /// Framing and parsing mode.
    #[serde(alias = "rfc")]
    pub format: SyslogFormat,

    /// Bound of the hand-off channel between acceptor and reader.
    pub channel_capacity: usize,

    /// Largest accepted frame or datagram in bytes.
    pub max_message_size: usize,
}

impl Default for SyslogSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:514".to_string(),
            protocol: Transport::Udp,
            use_tls: false,
            svr_cert: String::new(),
            priv_key: String::new(),
            ca_cert: None,
            cli_auth: false,
            format: SyslogFormat::Automatic,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_message_size: 64 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
