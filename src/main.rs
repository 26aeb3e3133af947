#![forbid(unsafe_code)]

//! `care-relay` — assessment session orchestrator binary.
//!
//! Bootstraps configuration, wires the inference gateway and specialist
//! platform client into the session manager, and runs until a shutdown
//! signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use care_relay::config::GlobalConfig;
use care_relay::inference::HttpInferenceGateway;
use care_relay::orchestrator::events;
use care_relay::orchestrator::session_manager::SessionManager;
use care_relay::orchestrator::synthesizer::ReportSynthesizer;
use care_relay::platform::{HandoffClient, HttpPlatformClient};
use care_relay::store::SessionStore;
use care_relay::{AppError, Result};

/// Capacity of the session event channel.
const EVENT_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "care-relay", about = "Assessment session orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("care-relay orchestrator bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    config.load_credentials().await?;
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Wire components ─────────────────────────────────
    let store = Arc::new(SessionStore::new());
    let gateway = Arc::new(HttpInferenceGateway::from_config(&config.inference)?);
    let platform = Arc::new(HttpPlatformClient::from_config(&config.platform)?);
    let handoff = Arc::new(HandoffClient::new(platform, &config.reconciliation));
    let synthesizer = Arc::new(ReportSynthesizer::new(
        gateway,
        config.synthesis.max_attempts,
    ));

    let ct = CancellationToken::new();
    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let event_task = events::spawn_event_logger(event_rx, ct.clone());

    let manager = SessionManager::new(
        Arc::clone(&store),
        synthesizer,
        handoff,
        &config,
        event_tx,
        ct.clone(),
    );
    info!("session manager ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    // ── Graceful shutdown ───────────────────────────────
    manager.shutdown().await;
    ct.cancel();
    let _ = event_task.await;
    info!("care-relay shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
