#![forbid(unsafe_code)]

//! `browser-warden-heartbeat` — worker-side heartbeat monitor.
//!
//! Runs inside each worker container alongside the browser server. Polls
//! the orchestrator's health endpoint and brings the container down when
//! the orchestrator is unreachable or has changed identity, so orphaned
//! workers never outlive their orchestrator.
//!
//! Configuration comes entirely from the container environment:
//! `ORCHESTRATOR_URL`, `ORCHESTRATOR_ID`, and an optional
//! `HEARTBEAT_INTERVAL_SECONDS` override.

use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use browser_warden::heartbeat::{self, TerminateReason, POLL_INTERVAL, POLL_TIMEOUT};

fn main() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(env_filter).try_init();

    let Ok(orchestrator_url) = std::env::var("ORCHESTRATOR_URL") else {
        error!("ORCHESTRATOR_URL not set; refusing to run unsupervised");
        terminate_worker();
        return;
    };
    let Ok(orchestrator_id) = std::env::var("ORCHESTRATOR_ID") else {
        error!("ORCHESTRATOR_ID not set; refusing to run unsupervised");
        terminate_worker();
        return;
    };
    let interval = std::env::var("HEARTBEAT_INTERVAL_SECONDS")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .map_or(POLL_INTERVAL, Duration::from_secs);

    info!(%orchestrator_url, %orchestrator_id, "heartbeat monitor starting");

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to build runtime");
            terminate_worker();
            return;
        }
    };

    let reason = runtime.block_on(async {
        let client = reqwest::Client::builder()
            .timeout(POLL_TIMEOUT)
            .build()
            .unwrap_or_default();
        heartbeat::run(&client, &orchestrator_url, &orchestrator_id, interval).await
    });

    match reason {
        TerminateReason::Unreachable => {
            error!("orchestrator unreachable past failure threshold; shutting down worker");
        }
        TerminateReason::IdentityMismatch => {
            error!("orchestrator identity changed; this worker is orphaned, shutting down");
        }
    }
    terminate_worker();
}

/// Bring the container down by signalling its init process; fall back to
/// exiting nonzero, which trips the container's restart/health policy.
fn terminate_worker() {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        if let Err(err) = kill(Pid::from_raw(1), Signal::SIGTERM) {
            error!(%err, "failed to signal container init");
        }
    }
    std::process::exit(1);
}
