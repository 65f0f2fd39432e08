#![forbid(unsafe_code)]

//! `browser-warden` — remote browser orchestrator binary.
//!
//! Bootstraps configuration, the Docker-backed worker runtime, the browser
//! connection registry, the idle reaper, and the HTTP surface.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use browser_warden::browser::cdp::CdpEngine;
use browser_warden::browser::BrowserRegistry;
use browser_warden::config::GlobalConfig;
use browser_warden::http::{self, AppState};
use browser_warden::orchestrator::{reaper, Orchestrator};
use browser_warden::persistence::SessionStore;
use browser_warden::worker::{ContainerRuntime, DockerRuntime};
use browser_warden::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "browser-warden", about = "Remote browser orchestrator", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the HTTP listen port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("browser-warden server bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(port) = args.port {
        config.port = port;
    }
    config.load_auth_secret();
    let config = Arc::new(config);
    info!("configuration loaded");

    // ── Wire components ─────────────────────────────────
    let store = Arc::new(SessionStore::new(&config)?);
    let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerRuntime::new(config.worker.clone())?);
    let registry = BrowserRegistry::new(Arc::new(CdpEngine::new()), Arc::clone(&store));
    let orchestrator = Orchestrator::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::clone(&runtime),
        Arc::clone(&registry),
    );
    info!(orchestrator_id = orchestrator.orchestrator_id(), "components wired");

    // Shared network creation is idempotent; a missing daemon surfaces
    // later as a ProvisionError on the first session start.
    if let Err(err) = runtime.ensure_ready().await {
        warn!(%err, "container runtime not ready at startup");
    }

    // ── Start background tasks ──────────────────────────
    let ct = CancellationToken::new();
    let reaper_handle = reaper::spawn_reaper(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.reaper_interval_seconds),
        ct.clone(),
    );
    info!("idle reaper started");

    let state = Arc::new(AppState {
        orchestrator,
        store,
        config,
    });

    let server_ct = ct.clone();
    let server_state = Arc::clone(&state);
    let server_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(server_state, server_ct).await {
            error!(%err, "http server failed");
        }
    });

    info!("browser-warden ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    // ── Graceful shutdown: stop every active session ────
    graceful_shutdown(&state).await;

    let _ = tokio::join!(server_handle, reaper_handle);
    info!("browser-warden shut down");
    Ok(())
}

/// Stop all sessions so workers are reclaimed and storage state is flushed
/// before the process exits. Remaining workers would self-terminate via the
/// heartbeat protocol, but an orderly stop preserves their context state.
async fn graceful_shutdown(state: &AppState) {
    let _span = tracing::info_span!("graceful_shutdown").entered();
    let report = state.orchestrator.stop_all_sessions().await;
    if report > 0 {
        info!(stopped = report, "stopped active sessions on shutdown");
    }
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
