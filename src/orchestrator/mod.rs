//! Session orchestration: the session catalogue and state machine, worker
//! provisioning, lazy browser connection, and the idle-timeout reaper.

pub mod reaper;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{info, info_span, warn};
use url::Url;
use uuid::Uuid;

use crate::browser::BrowserRegistry;
use crate::config::GlobalConfig;
use crate::models::session::{CreateSessionRequest, LaunchOptions, ProfileRef, Session, SessionStatus};
use crate::persistence::SessionStore;
use crate::worker::runtime::{worker_env, ContainerRuntime, WorkerSpec};
use crate::worker::provision;
use crate::{AppError, Result};

/// Non-fatal failures accumulated while stopping a session.
///
/// Stop paths always complete; secondary failures are reported here instead
/// of aborting the teardown.
#[derive(Debug, Default)]
pub struct StopReport {
    /// Human-readable descriptions of swallowed failures.
    pub warnings: Vec<String>,
}

/// Build the worker automation endpoint, embedding launch flags as query
/// parameters the worker's browser server interprets at connect time.
///
/// # Errors
///
/// Returns `AppError::Provision` when the worker address does not form a
/// valid URL.
pub fn automation_endpoint(address: &str, launch: Option<&LaunchOptions>) -> Result<String> {
    let mut url = Url::parse(&format!("ws://{address}/session"))
        .map_err(|err| AppError::Provision(format!("invalid worker address: {err}")))?;
    if let Some(launch) = launch {
        let mut query = url.query_pairs_mut();
        if let Some(headless) = launch.headless {
            query.append_pair("headless", if headless { "true" } else { "false" });
        }
        for arg in &launch.args {
            let Some(stripped) = arg.strip_prefix("--") else {
                continue;
            };
            match stripped.split_once('=') {
                Some((key, value)) => query.append_pair(key, value),
                None => query.append_pair(stripped, ""),
            };
        }
        if let Some(viewport) = launch.viewport {
            query.append_pair("width", &viewport.width.to_string());
            query.append_pair("height", &viewport.height.to_string());
        }
        drop(query);
        if url.query() == Some("") {
            url.set_query(None);
        }
    }
    Ok(url.to_string())
}

/// Owner of all session records and driver of the worker and browser layers.
pub struct Orchestrator {
    config: Arc<GlobalConfig>,
    orchestrator_id: String,
    sessions: Mutex<HashMap<String, Session>>,
    store: Arc<SessionStore>,
    runtime: Arc<dyn ContainerRuntime>,
    registry: Arc<BrowserRegistry>,
    http: reqwest::Client,
}

impl Orchestrator {
    /// Wire the orchestrator over its collaborators.
    ///
    /// The instance identifier comes from the `ORCHESTRATOR_ID` environment
    /// variable when set, otherwise a fresh one is generated — workers
    /// launched by a previous instance will observe the change and
    /// self-terminate.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        store: Arc<SessionStore>,
        runtime: Arc<dyn ContainerRuntime>,
        registry: Arc<BrowserRegistry>,
    ) -> Arc<Self> {
        let orchestrator_id = std::env::var("ORCHESTRATOR_ID")
            .ok()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| format!("orch-{}", Uuid::new_v4()));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            config,
            orchestrator_id,
            sessions: Mutex::new(HashMap::new()),
            store,
            runtime,
            registry,
            http,
        })
    }

    /// Unique identifier of this orchestrator instance, reported on
    /// `/health` and matched by worker heartbeats.
    #[must_use]
    pub fn orchestrator_id(&self) -> &str {
        &self.orchestrator_id
    }

    /// Registry handle for browser-level operations.
    #[must_use]
    pub fn registry(&self) -> &Arc<BrowserRegistry> {
        &self.registry
    }

    /// Create a new idle session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` when the request references an unknown
    /// named profile.
    pub async fn create_session(&self, request: CreateSessionRequest) -> Result<Session> {
        let profile = match request.profile {
            Some(name) => {
                let dir = self.store.profile_dir(&name);
                if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                    return Err(AppError::NotFound(format!("profile {name} not found")));
                }
                Some(ProfileRef::Named(name))
            }
            None => None,
        };
        let session = Session::new(request.launch_options, request.idle_timeout_seconds, profile);
        info!(session_id = %session.id, "session created");
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Create an idle session seeded from an uploaded storage-state archive.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the archive cannot be stored.
    pub async fn create_session_from_archive(&self, bytes: Vec<u8>) -> Result<Session> {
        let blob_id = self.store.store_archive(bytes).await?;
        let session = Session::new(None, None, Some(ProfileRef::Archive(blob_id)));
        info!(session_id = %session.id, "session created from archive");
        self.sessions
            .lock()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    /// Fetch a session record.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids.
    pub async fn get_session(&self, session_id: &str) -> Result<Session> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))
    }

    /// Update the session's last-used timestamp. Unknown ids are ignored.
    pub async fn touch_session(&self, session_id: &str) {
        if let Some(session) = self.sessions.lock().await.get_mut(session_id) {
            session.last_used_at = Utc::now();
        }
    }

    /// Ensure the session has a running worker and a computed automation
    /// endpoint.
    ///
    /// Idempotent fast path: an active session whose worker is confirmed
    /// healthy is returned immediately after a best-effort reconnect of the
    /// browser handle. The browser connection itself is otherwise
    /// established lazily on the first browser operation.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids, or
    /// `AppError::Provision` when the worker fails to start — the session
    /// stays idle so the caller may retry.
    pub async fn start_session(&self, session_id: &str) -> Result<Session> {
        let span = info_span!("start_session", session_id);
        let _guard = span.enter();

        let session = self.get_session(session_id).await?;
        self.touch_session(session_id).await;

        if session.status == SessionStatus::Active {
            if let (Some(worker_id), Some(endpoint)) =
                (&session.worker_id, &session.automation_endpoint)
            {
                if self.runtime.is_running(worker_id).await {
                    // Best-effort reconnect; failures fall through to the
                    // lazy path on the next browser operation.
                    if let Err(err) = self.registry.connect(session_id, endpoint).await {
                        warn!(session_id, %err, "reconnect attempt failed");
                    }
                    return self.get_session(session_id).await;
                }
                info!(session_id, worker_id = %worker_id, "worker no longer running; restarting");
            }
        }

        let profile_mount = self.prepare_profile_mount(&session).await?;
        let orchestrator_url = format!(
            "http://{}:{}",
            self.config.orchestrator_host, self.config.port
        );
        let spec = WorkerSpec {
            session_id: session.id.clone(),
            profile_mount,
            env: worker_env(
                &orchestrator_url,
                &self.orchestrator_id,
                &session.id,
                self.config.worker.connection_timeout_ms,
            ),
        };

        let worker = self.runtime.start_worker(&spec).await?;

        if let Err(err) = provision::wait_for_worker(
            &self.http,
            &worker.address,
            self.config.worker.readiness_attempts,
            Duration::from_millis(self.config.worker.readiness_delay_ms),
        )
        .await
        {
            self.runtime.stop_worker(&worker.id).await;
            return Err(err);
        }

        let endpoint = automation_endpoint(&worker.address, session.launch_options.as_ref())?;

        let mut sessions = self.sessions.lock().await;
        let record = sessions
            .get_mut(session_id)
            .ok_or_else(|| AppError::NotFound(format!("session {session_id} not found")))?;
        record.mark_active(worker.id, endpoint);
        Ok(record.clone())
    }

    /// Resolve the host directory mounted as the worker's profile data.
    async fn prepare_profile_mount(
        &self,
        session: &Session,
    ) -> Result<Option<std::path::PathBuf>> {
        match &session.profile {
            Some(ProfileRef::Named(name)) => Ok(Some(self.store.profile_dir(name))),
            Some(ProfileRef::Archive(blob_id)) => {
                self.store
                    .extract_archive_once(&session.id, blob_id)
                    .await?;
                Ok(Some(self.store.session_dir(&session.id)))
            }
            None => Ok(None),
        }
    }

    /// Stop a session: tear down its registry state (flushing storage
    /// state), stop the container, purge transient profile data, and reset
    /// it to idle.
    ///
    /// Idempotent — stopping an idle or unknown session is a no-op, and the
    /// teardown always completes, accumulating secondary failures in the
    /// returned report.
    pub async fn stop_session(&self, session_id: &str) -> StopReport {
        let span = info_span!("stop_session", session_id);
        let _guard = span.enter();

        let mut report = StopReport::default();
        let Some(session) = self.sessions.lock().await.get(session_id).cloned() else {
            return report;
        };
        if session.status != SessionStatus::Active {
            // Already idle; cleanup below would find nothing.
            return report;
        }

        report.warnings = self.registry.cleanup_session(session_id).await;

        if let Some(ref worker_id) = session.worker_id {
            self.runtime.stop_worker(worker_id).await;
        }

        match &session.profile {
            Some(ProfileRef::Named(name)) => {
                // Profile data does not outlive the session that used it;
                // export beforehand is the supported escape hatch.
                self.store.delete_profile(name).await;
            }
            Some(ProfileRef::Archive(blob_id)) => {
                self.store.delete_archive(blob_id).await;
                self.store.purge_session_dir(session_id).await;
            }
            None => {}
        }

        if let Some(record) = self.sessions.lock().await.get_mut(session_id) {
            record.mark_idle();
        }
        info!(session_id, warnings = report.warnings.len(), "session stopped");
        report
    }

    /// Lazily establish the browser connection for an active session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for unknown ids,
    /// `AppError::NotConnected` when the session has not been started, or
    /// `AppError::Automation` when the connection fails.
    pub async fn ensure_connected(&self, session_id: &str) -> Result<()> {
        let session = self.get_session(session_id).await?;
        let Some(endpoint) = session.automation_endpoint else {
            return Err(AppError::NotConnected(format!(
                "session {session_id} is not started"
            )));
        };
        self.registry.connect(session_id, &endpoint).await
    }

    /// Stop every active session, returning how many were stopped. Used on
    /// graceful shutdown so workers are reclaimed and storage state flushed.
    pub async fn stop_all_sessions(&self) -> usize {
        let active: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|session| session.status == SessionStatus::Active)
                .map(|session| session.id.clone())
                .collect()
        };
        let count = active.len();
        for session_id in active {
            let report = self.stop_session(&session_id).await;
            for warning in report.warnings {
                warn!(%session_id, %warning, "shutdown stop warning");
            }
        }
        count
    }

    /// One reaper sweep: stop every active session idle past its effective
    /// timeout. Per-session failures are isolated so one bad session cannot
    /// block the rest of the sweep.
    pub async fn reap_idle_sessions(&self) {
        let default_timeout = Duration::from_secs(self.config.session_timeout_seconds);
        let now = Utc::now();
        let expired: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|session| session.status == SessionStatus::Active)
                .filter(|session| session.idle_for(now) > session.effective_timeout(default_timeout))
                .map(|session| session.id.clone())
                .collect()
        };

        for session_id in expired {
            info!(%session_id, "session timed out; stopping worker");
            let report = self.stop_session(&session_id).await;
            for warning in report.warnings {
                warn!(%session_id, %warning, "reaper stop warning");
            }
        }
    }
}
