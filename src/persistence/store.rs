//! Durable layout for sessions and profiles.
//!
//! Layout under the configured data directory:
//!
//! ```text
//! data/
//!   sessions/<session-id>/        extracted profile/archive contents
//!     contexts.json               known context ids for the session
//!     context-<context-id>.json   storage-state blob per context
//!   profiles/<name>/              named persistent profiles
//!   archives/<blob-id>.zip        uploaded archives prior to extraction
//! ```
//!
//! The on-disk snapshot is advisory: restart recovery treats missing or
//! unreadable entries as absent rather than failing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::config::GlobalConfig;
use crate::models::storage::StorageState;
use crate::persistence::archive;
use crate::{AppError, Result};

/// File name of the per-session context-id list.
const CONTEXTS_FILE: &str = "contexts.json";

/// Access to the durable session/profile layout.
///
/// Context-list writes are linearized per session via
/// [`persist_lock`](Self::persist_lock) so concurrent context creation
/// cannot lose updates.
pub struct SessionStore {
    sessions_dir: PathBuf,
    profiles_dir: PathBuf,
    archives_dir: PathBuf,
    persist_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionStore {
    /// Create the store, ensuring the layout directories exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if a directory cannot be created.
    pub fn new(config: &GlobalConfig) -> Result<Self> {
        let sessions_dir = config.sessions_dir();
        let profiles_dir = config.profiles_dir();
        let archives_dir = config.archives_dir();
        std::fs::create_dir_all(&sessions_dir)?;
        std::fs::create_dir_all(&profiles_dir)?;
        std::fs::create_dir_all(&archives_dir)?;
        Ok(Self {
            sessions_dir,
            profiles_dir,
            archives_dir,
            persist_locks: Mutex::new(HashMap::new()),
        })
    }

    /// Directory holding a session's extracted contents and metadata.
    #[must_use]
    pub fn session_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(session_id)
    }

    /// Directory holding a named profile.
    #[must_use]
    pub fn profile_dir(&self, name: &str) -> PathBuf {
        self.profiles_dir.join(name)
    }

    /// Path of a session's context storage-state file.
    #[must_use]
    pub fn context_state_file(&self, session_id: &str, context_id: &str) -> PathBuf {
        self.session_dir(session_id)
            .join(format!("context-{context_id}.json"))
    }

    /// Per-session lock linearizing context-list persistence.
    pub async fn persist_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.persist_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Read the session's known context ids. Missing or unreadable files
    /// yield an empty list.
    pub async fn read_context_ids(&self, session_id: &str) -> Vec<String> {
        let path = self.session_dir(session_id).join(CONTEXTS_FILE);
        match tokio::fs::read(&path).await {
            Ok(raw) => serde_json::from_slice(&raw).unwrap_or_else(|err| {
                warn!(session_id, %err, "context list unreadable; treating as empty");
                Vec::new()
            }),
            Err(_) => Vec::new(),
        }
    }

    /// Write the session's context-id list.
    ///
    /// Callers must hold the session's [`persist_lock`](Self::persist_lock)
    /// across the in-memory snapshot and this write.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` on I/O failure.
    pub async fn write_context_ids(&self, session_id: &str, ids: &[String]) -> Result<()> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(transport_err)?;
        let raw = serde_json::to_vec(ids)?;
        tokio::fs::write(dir.join(CONTEXTS_FILE), raw)
            .await
            .map_err(transport_err)
    }

    /// Read a context's saved storage state, if any.
    pub async fn read_context_state(
        &self,
        session_id: &str,
        context_id: &str,
    ) -> Option<StorageState> {
        let path = self.context_state_file(session_id, context_id);
        let raw = tokio::fs::read(&path).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(state) => Some(state),
            Err(err) => {
                warn!(session_id, context_id, %err, "storage state unreadable; skipping");
                None
            }
        }
    }

    /// Persist a context's storage state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` on I/O failure.
    pub async fn write_context_state(
        &self,
        session_id: &str,
        context_id: &str,
        state: &StorageState,
    ) -> Result<()> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(transport_err)?;
        let raw = serde_json::to_vec(state)?;
        tokio::fs::write(self.context_state_file(session_id, context_id), raw)
            .await
            .map_err(transport_err)
    }

    /// Delete a context's storage-state file. Missing files are fine.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Transport` on I/O failure other than absence.
    pub async fn remove_context_state(&self, session_id: &str, context_id: &str) -> Result<()> {
        let path = self.context_state_file(session_id, context_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(transport_err(err)),
        }
    }

    /// Store an uploaded session archive, returning its blob id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` on write failure.
    pub async fn store_archive(&self, bytes: Vec<u8>) -> Result<String> {
        let blob_id = format!("{}.zip", Uuid::new_v4());
        tokio::fs::write(self.archives_dir.join(&blob_id), bytes).await?;
        Ok(blob_id)
    }

    /// Extract a stored archive into the session directory.
    ///
    /// Idempotent: when the session directory already exists the previous
    /// extraction (and any metadata written since) is reused untouched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the blob is missing or malformed.
    pub async fn extract_archive_once(&self, session_id: &str, blob_id: &str) -> Result<()> {
        let dest = self.session_dir(session_id);
        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Ok(());
        }
        let bytes = tokio::fs::read(self.archives_dir.join(blob_id)).await?;
        let dest = dest.clone();
        tokio::task::spawn_blocking(move || archive::unzip_into(&bytes, &dest))
            .await
            .map_err(|err| AppError::Io(format!("archive extraction task panicked: {err}")))?
    }

    /// Import an uploaded archive as a named profile, replacing any
    /// previous contents.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the archive is malformed or the profile
    /// directory cannot be written.
    pub async fn import_profile(&self, name: &str, bytes: Vec<u8>) -> Result<()> {
        let dir = self.profile_dir(name);
        if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::task::spawn_blocking(move || archive::unzip_into(&bytes, &dir))
            .await
            .map_err(|err| AppError::Io(format!("profile import task panicked: {err}")))?
    }

    /// Export a named profile as zip bytes, or `None` when it is unknown.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` when the profile exists but cannot be read.
    pub async fn export_profile(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let dir = self.profile_dir(name);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(None);
        }
        let bytes = tokio::task::spawn_blocking(move || archive::zip_dir(&dir))
            .await
            .map_err(|err| AppError::Io(format!("profile export task panicked: {err}")))??;
        Ok(Some(bytes))
    }

    /// Delete a named profile's working copy. Best-effort.
    pub async fn delete_profile(&self, name: &str) {
        let dir = self.profile_dir(name);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(profile = name, %err, "failed to delete profile");
            }
        }
    }

    /// Delete a stored archive blob. Best-effort.
    pub async fn delete_archive(&self, blob_id: &str) {
        let path = self.archives_dir.join(blob_id);
        if let Err(err) = tokio::fs::remove_file(&path).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(blob_id, %err, "failed to delete archive blob");
            }
        }
    }

    /// Delete a session's durable directory. Best-effort.
    pub async fn purge_session_dir(&self, session_id: &str) {
        let dir = self.session_dir(session_id);
        if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id, %err, "failed to purge session directory");
            }
        }
    }
}

fn transport_err(err: std::io::Error) -> AppError {
    AppError::Transport(err.to_string())
}
