//! Session model and lifecycle helpers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status for a browser session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session created but no worker is running.
    Idle,
    /// Worker provisioned; the automation endpoint is reachable.
    Active,
    /// Session explicitly destroyed; terminal.
    Closed,
}

/// Browser viewport dimensions forwarded to the worker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Viewport {
    /// Width in CSS pixels.
    pub width: u32,
    /// Height in CSS pixels.
    pub height: u32,
}

/// Launch configuration embedded into the worker's automation endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchOptions {
    /// Whether the browser runs headless.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    /// Extra `--flag[=value]` arguments for the browser process.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Initial viewport for new pages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
}

/// Reference to durable profile data seeded into a session's worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProfileRef {
    /// A named persistent profile under the profiles directory.
    Named(String),
    /// A one-off imported storage-state archive, by blob id.
    Archive(String),
}

/// Top-level unit of isolation: one browser instance per client request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Last activity timestamp; drives the idle reaper.
    pub last_used_at: DateTime<Utc>,
    /// Launch configuration recorded at creation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub launch_options: Option<LaunchOptions>,
    /// Per-session idle timeout override, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_seconds: Option<u64>,
    /// Profile or archive reference mounted into the worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileRef>,
    /// Runtime identifier of the worker container. Set iff active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_id: Option<String>,
    /// Automation endpoint address. Set iff active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation_endpoint: Option<String>,
}

impl Session {
    /// Construct a new idle session with a generated identifier.
    #[must_use]
    pub fn new(
        launch_options: Option<LaunchOptions>,
        idle_timeout_seconds: Option<u64>,
        profile: Option<ProfileRef>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            status: SessionStatus::Idle,
            last_used_at: Utc::now(),
            launch_options,
            idle_timeout_seconds,
            profile,
            worker_id: None,
            automation_endpoint: None,
        }
    }

    /// Whether the record satisfies the status invariant: worker id and
    /// automation endpoint are both set if and only if the session is active.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let provisioned = self.worker_id.is_some() && self.automation_endpoint.is_some();
        let bare = self.worker_id.is_none() && self.automation_endpoint.is_none();
        match self.status {
            SessionStatus::Active => provisioned,
            SessionStatus::Idle | SessionStatus::Closed => bare,
        }
    }

    /// Resolve the effective idle timeout: per-session override else the
    /// global default.
    #[must_use]
    pub fn effective_timeout(&self, default: Duration) -> Duration {
        self.idle_timeout_seconds
            .map_or(default, Duration::from_secs)
    }

    /// Seconds of inactivity relative to `now`. Saturates at zero when the
    /// clock reads earlier than `last_used_at`.
    #[must_use]
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_used_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Transition to active with the given worker id and endpoint.
    pub fn mark_active(&mut self, worker_id: String, endpoint: String) {
        self.status = SessionStatus::Active;
        self.worker_id = Some(worker_id);
        self.automation_endpoint = Some(endpoint);
        self.last_used_at = Utc::now();
    }

    /// Revert to idle, clearing the worker id and endpoint.
    pub fn mark_idle(&mut self) {
        self.status = SessionStatus::Idle;
        self.worker_id = None;
        self.automation_endpoint = None;
    }
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CreateSessionRequest {
    /// Launch configuration for the worker's browser.
    pub launch_options: Option<LaunchOptions>,
    /// Idle timeout override, in seconds.
    pub idle_timeout_seconds: Option<u64>,
    /// Name of a persistent profile to mount.
    pub profile: Option<String>,
}
