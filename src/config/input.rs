//! Validated, immutable input configurations.
//!
//! Built once from a schema section and handed by value to an input.
//! Nothing here is mutated after construction.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::schema::{AckMode, LumberjackSection, SyslogFormat, SyslogSection, Transport};
use crate::config::validation::{validate_lumberjack, validate_syslog};

/// Key material for a TLS listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsMaterials {
    /// Server certificate chain (PEM).
    pub cert_path: PathBuf,
    /// Server private key (PEM).
    pub key_path: PathBuf,
    /// Trust roots for client certificates.
    pub ca_cert_path: Option<PathBuf>,
    /// Require and verify a client certificate.
    pub require_client_auth: bool,
}

/// Listener settings shared by every protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Bind address as configured ("host:port").
    pub bind: String,
    /// Transport to listen on.
    pub transport: Transport,
    /// TLS material when the listener is TLS-wrapped.
    pub tls: Option<TlsMaterials>,
    /// Bound of the hand-off channel.
    pub channel_capacity: usize,
}

/// Lumberjack input configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LumberjackConfig {
    pub listener: ListenerConfig,
    pub ack_mode: AckMode,
    pub keepalive: Duration,
    pub read_timeout: Duration,
}

impl LumberjackConfig {
    /// Validate a schema section into an immutable config.
    pub fn from_section(section: &LumberjackSection) -> Result<Self, ConfigError> {
        validate_lumberjack(section).map_err(ConfigError::Validation)?;
        Ok(Self {
            listener: ListenerConfig {
                bind: section.bind.clone(),
                transport: Transport::Tcp,
                tls: Some(tls_materials(
                    &section.svr_cert,
                    &section.priv_key,
                    section.ca_cert.as_deref(),
                    section.cli_auth,
                )),
                channel_capacity: section.channel_capacity,
            },
            ack_mode: section.ack_mode,
            keepalive: Duration::from_secs(section.keepalive_secs),
            read_timeout: Duration::from_secs(section.read_timeout_secs),
        })
    }
}

/// Syslog input configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyslogConfig {
    pub listener: ListenerConfig,
    pub format: SyslogFormat,
    pub max_message_size: usize,
}

impl SyslogConfig {
    /// Validate a schema section into an immutable config.
    pub fn from_section(section: &SyslogSection) -> Result<Self, ConfigError> {
        validate_syslog(section).map_err(ConfigError::Validation)?;
        let tls = section.use_tls.then(|| {
            tls_materials(
                &section.svr_cert,
                &section.priv_key,
                section.ca_cert.as_deref(),
                section.cli_auth,
            )
        });
        Ok(Self {
            listener: ListenerConfig {
                bind: section.bind.clone(),
                transport: section.protocol,
                tls,
                channel_capacity: section.channel_capacity,
            },
            format: section.format,
            max_message_size: section.max_message_size,
        })
    }
}

fn tls_materials(cert: &str, key: &str, ca_cert: Option<&str>, cli_auth: bool) -> TlsMaterials {
    TlsMaterials {
        cert_path: PathBuf::from(cert),
        key_path: PathBuf::from(key),
        ca_cert_path: ca_cert.filter(|ca| !ca.trim().is_empty()).map(PathBuf::from),
        require_client_auth: cli_auth,
    }
}
