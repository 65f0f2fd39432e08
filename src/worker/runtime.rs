//! Container runtime contract consumed by the orchestrator.
//!
//! The trait is deliberately narrow: the orchestrator only needs to turn a
//! session into a reachable worker and reclaim it later. Tests substitute an
//! in-memory runtime; production uses [`DockerRuntime`](crate::worker::DockerRuntime).

use std::path::PathBuf;

use async_trait::async_trait;

use crate::Result;

/// Fixed path inside the worker container where profile data is mounted.
pub const PROFILE_MOUNT_PATH: &str = "/session-profile";

/// Port the automation server listens on inside the worker container.
pub const WORKER_PORT: u16 = 3000;

/// Deterministic container name for a session's worker.
///
/// Using the session id makes crash recovery possible: a restarted
/// orchestrator can remove the stale container before starting a new one.
#[must_use]
pub fn worker_container_name(session_id: &str) -> String {
    format!("browser-worker-{session_id}")
}

/// Environment contract injected into every worker container.
///
/// The heartbeat monitor inside the worker reads `ORCHESTRATOR_URL` and
/// `ORCHESTRATOR_ID` to detect orphaning; the automation server reads
/// `SESSION_ID`, `CONNECTION_TIMEOUT`, and `USER_DATA_DIR`.
#[must_use]
pub fn worker_env(
    orchestrator_url: &str,
    orchestrator_id: &str,
    session_id: &str,
    connection_timeout_ms: u64,
) -> Vec<String> {
    vec![
        format!("ORCHESTRATOR_URL={orchestrator_url}"),
        format!("ORCHESTRATOR_ID={orchestrator_id}"),
        format!("SESSION_ID={session_id}"),
        format!("CONNECTION_TIMEOUT={connection_timeout_ms}"),
        format!("USER_DATA_DIR={PROFILE_MOUNT_PATH}"),
    ]
}

/// Everything the runtime needs to start one worker container.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    /// Owning session id.
    pub session_id: String,
    /// Host directory bind-mounted read-write at [`PROFILE_MOUNT_PATH`],
    /// when the session references profile data.
    pub profile_mount: Option<PathBuf>,
    /// Environment contract from [`worker_env`].
    pub env: Vec<String>,
}

/// A running worker container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerHandle {
    /// Runtime identifier (container name).
    pub id: String,
    /// Reachable `host:port` of the worker's automation server.
    pub address: String,
}

/// Narrow contract over the container runtime engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Ensure shared prerequisites (the isolated worker network) exist.
    /// Idempotent; called once at startup.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provision` when the runtime is unreachable.
    async fn ensure_ready(&self) -> Result<()>;

    /// Provision and start a worker container for the session, removing any
    /// stale container with the same deterministic name first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provision` on image or container failure.
    async fn start_worker(&self, spec: &WorkerSpec) -> Result<WorkerHandle>;

    /// Best-effort stop and removal. Logs failures; never errors.
    async fn stop_worker(&self, worker_id: &str);

    /// Whether the container process is still running.
    async fn is_running(&self, worker_id: &str) -> bool;
}
