//! Worker readiness polling.

use std::time::Duration;

use tracing::{debug, warn};

use crate::{AppError, Result};

/// Poll the worker's version endpoint until it answers, with bounded
/// retries at a fixed delay.
///
/// # Errors
///
/// Returns `AppError::Provision` when the retry budget is exhausted; the
/// caller leaves the session idle so a retry is possible.
pub async fn wait_for_worker(
    client: &reqwest::Client,
    address: &str,
    attempts: u32,
    delay: Duration,
) -> Result<()> {
    let url = format!("http://{address}/json/version");
    for attempt in 1..=attempts {
        if attempt > 1 {
            tokio::time::sleep(delay).await;
        }
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(%address, attempt, "worker ready");
                return Ok(());
            }
            Ok(resp) => {
                debug!(%address, attempt, status = %resp.status(), "worker not ready");
            }
            Err(err) => {
                debug!(%address, attempt, %err, "worker unreachable");
            }
        }
    }
    warn!(%address, attempts, "worker failed readiness polling");
    Err(AppError::Provision(format!(
        "worker at {address} not ready after {attempts} attempts"
    )))
}
