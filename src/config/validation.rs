//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - TLS material must be present whenever TLS is active
//! - Client-certificate auth requires a CA bundle
//! - Value ranges (channel capacity, message size)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is a pure function over the schema
//! - Bind address syntax is left to the listener, which reports it as a bind failure

use crate::config::schema::{InputsConfig, LumberjackSection, SyslogSection, Transport};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{section}.{field}: {message}")]
pub struct ValidationError {
    /// Config table the field belongs to.
    pub section: &'static str,
    /// Offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl ValidationError {
    fn new(section: &'static str, field: &'static str, message: impl Into<String>) -> Self {
        Self {
            section,
            field,
            message: message.into(),
        }
    }
}

/// Validate every configured input.
pub fn validate_config(config: &InputsConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    if let Some(section) = &config.lumberjack {
        errors.extend(lumberjack_errors(section));
    }
    if let Some(section) = &config.syslog {
        errors.extend(syslog_errors(section));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate a lumberjack section.
pub fn validate_lumberjack(section: &LumberjackSection) -> Result<(), Vec<ValidationError>> {
    into_result(lumberjack_errors(section))
}

/// Validate a syslog section.
pub fn validate_syslog(section: &SyslogSection) -> Result<(), Vec<ValidationError>> {
    into_result(syslog_errors(section))
}

fn into_result(errors: Vec<ValidationError>) -> Result<(), Vec<ValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn lumberjack_errors(section: &LumberjackSection) -> Vec<ValidationError> {
    const SECTION: &str = "lumberjack";
    let mut errors = Vec::new();

    check_bind(SECTION, &section.bind, &mut errors);
    // TLS is not optional for lumberjack.
    check_tls(
        SECTION,
        &section.svr_cert,
        &section.priv_key,
        section.ca_cert.as_deref(),
        section.cli_auth,
        &mut errors,
    );
    check_capacity(SECTION, section.channel_capacity, &mut errors);

    if section.keepalive_secs == 0 {
        errors.push(ValidationError::new(SECTION, "keepalive_secs", "must be greater than 0"));
    }
    if section.read_timeout_secs == 0 {
        errors.push(ValidationError::new(SECTION, "read_timeout_secs", "must be greater than 0"));
    }
    errors
}

fn syslog_errors(section: &SyslogSection) -> Vec<ValidationError> {
    const SECTION: &str = "syslog";
    let mut errors = Vec::new();

    check_bind(SECTION, &section.bind, &mut errors);
    if section.use_tls {
        if section.protocol != Transport::Tcp {
            errors.push(ValidationError::new(
                SECTION,
                "use_tls",
                format!("TLS requires protocol TCP, got {}", section.protocol),
            ));
        }
        check_tls(
            SECTION,
            &section.svr_cert,
            &section.priv_key,
            section.ca_cert.as_deref(),
            section.cli_auth,
            &mut errors,
        );
    } else if section.cli_auth {
        errors.push(ValidationError::new(SECTION, "cli_auth", "requires use_tls"));
    }
    check_capacity(SECTION, section.channel_capacity, &mut errors);

    if section.max_message_size == 0 {
        errors.push(ValidationError::new(SECTION, "max_message_size", "must be greater than 0"));
    }
    errors
}

fn check_bind(section: &'static str, bind: &str, errors: &mut Vec<ValidationError>) {
    if bind.trim().is_empty() {
        errors.push(ValidationError::new(section, "bind", "must not be empty"));
    }
}

fn check_tls(
    section: &'static str,
    cert: &str,
    key: &str,
    ca_cert: Option<&str>,
    cli_auth: bool,
    errors: &mut Vec<ValidationError>,
) {
    if cert.trim().is_empty() {
        errors.push(ValidationError::new(section, "svr_cert", "required when TLS is enabled"));
    }
    if key.trim().is_empty() {
        errors.push(ValidationError::new(section, "priv_key", "required when TLS is enabled"));
    }
    if cli_auth && ca_cert.map_or(true, |ca| ca.trim().is_empty()) {
        errors.push(ValidationError::new(section, "ca_cert", "required when cli_auth is enabled"));
    }
}

fn check_capacity(section: &'static str, capacity: usize, errors: &mut Vec<ValidationError>) {
    if capacity == 0 {
        errors.push(ValidationError::new(section, "channel_capacity", "must be greater than 0"));
    }
}
