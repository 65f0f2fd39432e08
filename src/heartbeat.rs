//! Worker-side heartbeat protocol.
//!
//! Each worker polls the orchestrator's health endpoint on a short fixed
//! interval. Sustained unreachability trips a consecutive-failure threshold;
//! an orchestrator identity mismatch is fatal immediately — it means the
//! orchestrator restarted and this worker is orphaned. Either way the worker
//! self-terminates rather than continue serving stale state.
//!
//! The decision logic lives in [`HeartbeatState`], a pure state machine the
//! `browser-warden-heartbeat` binary drives from its poll loop.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, error, warn};

/// Default interval between health polls.
pub const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Per-request timeout for a health poll.
pub const POLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Consecutive failures tolerated before self-termination.
pub const MAX_FAILURES: u32 = 3;

/// Outcome of a single health poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Successful response with the expected orchestrator identity.
    Matched,
    /// Successful response reporting a different orchestrator identity.
    Mismatched,
    /// Non-success status, transport error, or unparsable body.
    Failure,
}

/// Why the worker decided to terminate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateReason {
    /// The consecutive-failure threshold was reached.
    Unreachable,
    /// The orchestrator identity changed; this worker is orphaned.
    IdentityMismatch,
}

/// Verdict after observing one poll outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling.
    Continue,
    /// Self-terminate the worker.
    Terminate(TerminateReason),
}

/// Consecutive-failure tracker for the heartbeat loop.
#[derive(Debug)]
pub struct HeartbeatState {
    failures: u32,
    threshold: u32,
}

impl HeartbeatState {
    /// Start with zero failures and the given threshold.
    #[must_use]
    pub fn new(threshold: u32) -> Self {
        Self {
            failures: 0,
            threshold,
        }
    }

    /// Current consecutive-failure count.
    #[must_use]
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Fold one poll outcome into the state and decide what to do next.
    ///
    /// A matching identity resets the failure counter; a mismatch
    /// terminates immediately regardless of prior failures.
    pub fn observe(&mut self, outcome: PollOutcome) -> Verdict {
        match outcome {
            PollOutcome::Matched => {
                self.failures = 0;
                Verdict::Continue
            }
            PollOutcome::Mismatched => Verdict::Terminate(TerminateReason::IdentityMismatch),
            PollOutcome::Failure => {
                self.failures += 1;
                if self.failures >= self.threshold {
                    Verdict::Terminate(TerminateReason::Unreachable)
                } else {
                    Verdict::Continue
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    orchestrator_id: String,
}

/// Perform one health poll and classify the outcome.
pub async fn poll_once(
    client: &reqwest::Client,
    orchestrator_url: &str,
    expected_id: &str,
) -> PollOutcome {
    let url = format!("{orchestrator_url}/health");
    let response = match client.get(&url).send().await {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "health poll failed");
            return PollOutcome::Failure;
        }
    };
    if !response.status().is_success() {
        warn!(status = %response.status(), "health poll returned non-success");
        return PollOutcome::Failure;
    }
    match response.json::<HealthBody>().await {
        Ok(body) if body.orchestrator_id == expected_id => {
            debug!("orchestrator healthy");
            PollOutcome::Matched
        }
        Ok(body) => {
            error!(
                expected = expected_id,
                reported = %body.orchestrator_id,
                "orchestrator identity mismatch"
            );
            PollOutcome::Mismatched
        }
        Err(err) => {
            warn!(%err, "health response unparsable");
            PollOutcome::Failure
        }
    }
}

/// Poll until a terminate verdict is reached.
///
/// Returns the reason so the binary can decide how to bring the worker
/// down.
pub async fn run(
    client: &reqwest::Client,
    orchestrator_url: &str,
    expected_id: &str,
    interval: Duration,
) -> TerminateReason {
    let mut state = HeartbeatState::new(MAX_FAILURES);
    loop {
        tokio::time::sleep(interval).await;
        let outcome = poll_once(client, orchestrator_url, expected_id).await;
        if let Verdict::Terminate(reason) = state.observe(outcome) {
            return reason;
        }
    }
}
