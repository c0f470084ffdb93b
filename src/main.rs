//! Ingest adapter demo driver.
//!
//! ```text
//!   shipper ──TLS──▶ lumberjack input ─┐
//!                                      ├─▶ records ─▶ stdout (JSON lines)
//!   syslog ──UDP/TCP/TLS──▶ syslog input ┘
//! ```
//!
//! Loads a TOML config, connects every configured input, prints records as
//! they arrive and closes on SIGINT/SIGTERM.

use std::io::Write;
use std::path::PathBuf;

use clap::Parser;

use ingest_adapter::config::{load_config, AckMode, LumberjackConfig, SyslogConfig};
use ingest_adapter::lifecycle::signals::trigger_on_signal;
use ingest_adapter::observability::{logging, metrics};
use ingest_adapter::{CancelCause, CancelToken, InputError, LumberjackInput, Record, SyslogInput};

#[derive(Parser)]
#[command(name = "ingest-adapter")]
#[command(about = "Receive lumberjack and syslog traffic and print it as JSON lines", long_about = None)]
struct Cli {
    /// Path to the TOML configuration.
    #[arg(short, long, default_value = "ingest.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level);
    tracing::info!(config = %cli.config.display(), "ingest-adapter v0.1.0 starting");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let lumberjack = config
        .lumberjack
        .as_ref()
        .map(LumberjackConfig::from_section)
        .transpose()?;
    let syslog = config.syslog.as_ref().map(SyslogConfig::from_section).transpose()?;
    if lumberjack.is_none() && syslog.is_none() {
        tracing::warn!("No inputs configured");
        return Ok(());
    }

    run_inputs(lumberjack, syslog).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Run every configured input until shutdown. The first input to fail
/// drops the others, which shuts them down.
async fn run_inputs(
    lumberjack: Option<LumberjackConfig>,
    syslog: Option<SyslogConfig>,
) -> Result<(), InputError> {
    tokio::try_join!(
        async move {
            match lumberjack {
                Some(config) => run_lumberjack(config)
                    .await
                    .inspect_err(|e| tracing::error!(input = "lumberjack", error = %e, "Input failed")),
                None => Ok(()),
            }
        },
        async move {
            match syslog {
                Some(config) => run_syslog(config)
                    .await
                    .inspect_err(|e| tracing::error!(input = "syslog", error = %e, "Input failed")),
                None => Ok(()),
            }
        },
    )?;
    Ok(())
}

async fn run_lumberjack(config: LumberjackConfig) -> Result<(), InputError> {
    let on_commit = config.ack_mode == AckMode::OnCommit;
    let mut input = LumberjackInput::new(config);
    input.connect().await?;
    let signals = trigger_on_signal(input.shutdown_handle());

    let cancel = CancelToken::new();
    let result = loop {
        match input.read_batch(&cancel).await {
            Ok((records, ack)) => {
                let written = emit(&records);
                if let Err(e) = &written {
                    tracing::error!(error = %e, "Failed to write records");
                }
                if on_commit {
                    if let Err(e) = ack.ack(written) {
                        tracing::warn!(error = %e, "Batch processed but not acknowledged");
                    }
                }
            }
            Err(InputError::Cancelled(CancelCause::ListenerClosed)) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    input.close().await?;
    signals.abort();
    result
}

async fn run_syslog(config: SyslogConfig) -> Result<(), InputError> {
    let mut input = SyslogInput::new(config);
    input.connect().await?;
    let signals = trigger_on_signal(input.shutdown_handle());

    let cancel = CancelToken::new();
    let result = loop {
        match input.read(&cancel).await {
            Ok((record, _ack)) => {
                if let Err(e) = emit(std::slice::from_ref(&record)) {
                    tracing::error!(error = %e, "Failed to write record");
                }
            }
            Err(InputError::Cancelled(CancelCause::ListenerClosed)) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    input.close().await?;
    signals.abort();
    result
}

/// Write records to stdout, one JSON document per line.
fn emit(records: &[Record]) -> std::io::Result<()> {
    let mut out = std::io::stdout().lock();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()
}
