//! Live-connection registry: one automation handle per active session plus
//! the session/context/page containment hierarchy.
//!
//! Four tables (contexts, pages, session→contexts, page→session) live behind
//! a single lock so they can only change together. Durable context metadata
//! is written through the store's per-session persist lock so interleaved
//! writers cannot lose updates; on restart the snapshot is advisory and
//! unreadable entries are skipped.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::engine::{AutomationEngine, BrowserHandle, ContextHandle, PageHandle};
use crate::models::storage::StorageState;
use crate::persistence::SessionStore;
use crate::{AppError, Result};

/// Connection lifecycle for one session.
///
/// `Provisioning` marks an endpoint being dialed; `Connected` carries the
/// live handle. Modeling the phase explicitly keeps the idempotent
/// reconnect path observable instead of inferred from handle presence.
enum ConnectionPhase {
    Provisioning,
    Connected(Arc<dyn BrowserHandle>),
}

struct PageEntry {
    handle: Arc<dyn PageHandle>,
    context_id: String,
}

#[derive(Default)]
struct Tables {
    connections: HashMap<String, ConnectionPhase>,
    contexts: HashMap<String, Arc<dyn ContextHandle>>,
    pages: HashMap<String, PageEntry>,
    session_contexts: HashMap<String, Vec<String>>,
    page_sessions: HashMap<String, String>,
}

/// Resolve the session owning a context by walking the ownership table.
///
/// The page→session lookup is derived through this single function so the
/// cross-table invariant stays in one place.
fn session_for_context(tables: &Tables, context_id: &str) -> Option<String> {
    tables
        .session_contexts
        .iter()
        .find(|(_, contexts)| contexts.iter().any(|id| id == context_id))
        .map(|(session_id, _)| session_id.clone())
}

/// Registry of live automation handles and the context/page hierarchy.
pub struct BrowserRegistry {
    engine: Arc<dyn AutomationEngine>,
    store: Arc<SessionStore>,
    tables: Mutex<Tables>,
    connect_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Handle to ourselves for disconnect observers; weak so observers on
    /// lingering connections cannot keep the registry alive.
    self_weak: Weak<Self>,
}

impl BrowserRegistry {
    /// Build the registry over an engine and the durable store.
    #[must_use]
    pub fn new(engine: Arc<dyn AutomationEngine>, store: Arc<SessionStore>) -> Arc<Self> {
        Arc::new_cyclic(|self_weak| Self {
            engine,
            store,
            tables: Mutex::new(Tables::default()),
            connect_locks: Mutex::new(HashMap::new()),
            self_weak: self_weak.clone(),
        })
    }

    async fn connect_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.connect_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_owned())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Whether the session currently has a live connection.
    pub async fn is_connected(&self, session_id: &str) -> bool {
        matches!(
            self.tables.lock().await.connections.get(session_id),
            Some(ConnectionPhase::Connected(_))
        )
    }

    /// Open the session's automation connection if it is not already live,
    /// then restore any contexts recorded in the durable snapshot.
    ///
    /// Idempotent; a lost connection later triggers full session cleanup via
    /// the disconnect observer.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the endpoint cannot be reached.
    pub async fn connect(&self, session_id: &str, endpoint: &str) -> Result<()> {
        let lock = self.connect_lock(session_id).await;
        let _guard = lock.lock().await;

        {
            let mut tables = self.tables.lock().await;
            if matches!(
                tables.connections.get(session_id),
                Some(ConnectionPhase::Connected(_))
            ) {
                return Ok(());
            }
            tables
                .connections
                .insert(session_id.to_owned(), ConnectionPhase::Provisioning);
        }

        let hook = {
            let registry = self.self_weak.clone();
            let session_id = session_id.to_owned();
            Box::new(move || disconnect_observer(&registry, session_id))
        };

        let browser = match self.engine.connect(endpoint, hook).await {
            Ok(browser) => browser,
            Err(err) => {
                self.tables.lock().await.connections.remove(session_id);
                return Err(err);
            }
        };

        info!(session_id, endpoint, "browser connected");
        self.tables.lock().await.connections.insert(
            session_id.to_owned(),
            ConnectionPhase::Connected(Arc::clone(&browser)),
        );

        self.restore_contexts(session_id, &browser).await;
        Ok(())
    }

    /// Reopen contexts recorded in the session's durable snapshot.
    ///
    /// The snapshot may run ahead of or behind reality; entries without a
    /// saved storage-state blob or that fail to reopen are skipped.
    async fn restore_contexts(&self, session_id: &str, browser: &Arc<dyn BrowserHandle>) {
        let known = self.store.read_context_ids(session_id).await;
        for context_id in known {
            if self.tables.lock().await.contexts.contains_key(&context_id) {
                continue;
            }
            let Some(state) = self.store.read_context_state(session_id, &context_id).await
            else {
                continue;
            };
            match browser.new_context(Some(state)).await {
                Ok(context) => {
                    info!(session_id, %context_id, "restored context");
                    let mut tables = self.tables.lock().await;
                    tables.contexts.insert(context_id.clone(), context);
                    let list = tables
                        .session_contexts
                        .entry(session_id.to_owned())
                        .or_default();
                    if !list.contains(&context_id) {
                        list.push(context_id);
                    }
                }
                Err(err) => {
                    warn!(session_id, %context_id, %err, "failed to restore context");
                }
            }
        }
    }

    /// Create an isolated context for a connected session.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotConnected` when the session has no live
    /// connection, or `AppError::Automation` on engine failure.
    pub async fn create_context(
        &self,
        session_id: &str,
        seed: Option<StorageState>,
    ) -> Result<String> {
        let browser = {
            let tables = self.tables.lock().await;
            match tables.connections.get(session_id) {
                Some(ConnectionPhase::Connected(browser)) => Arc::clone(browser),
                _ => {
                    return Err(AppError::NotConnected(format!(
                        "session {session_id} is not connected"
                    )))
                }
            }
        };

        let context = browser.new_context(seed).await?;
        let context_id = Uuid::new_v4().to_string();

        {
            let mut tables = self.tables.lock().await;
            tables.contexts.insert(context_id.clone(), context);
            tables
                .session_contexts
                .entry(session_id.to_owned())
                .or_default()
                .push(context_id.clone());
        }

        self.persist_context_list(session_id).await?;
        info!(session_id, %context_id, "context created");
        Ok(context_id)
    }

    /// Write the session's current context list to durable metadata.
    ///
    /// The snapshot is re-read from the tables while holding the session's
    /// persist lock, so concurrent context creations serialize their writes
    /// instead of clobbering each other.
    async fn persist_context_list(&self, session_id: &str) -> Result<()> {
        let lock = self.store.persist_lock(session_id).await;
        let _guard = lock.lock().await;
        let snapshot = {
            let tables = self.tables.lock().await;
            tables
                .session_contexts
                .get(session_id)
                .cloned()
                .unwrap_or_default()
        };
        self.store.write_context_ids(session_id, &snapshot).await
    }

    /// Create a page inside a context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown context, or
    /// `AppError::Automation` on engine failure.
    pub async fn create_page(&self, context_id: &str) -> Result<String> {
        let (context, session_id) = {
            let tables = self.tables.lock().await;
            let context = tables
                .contexts
                .get(context_id)
                .map(Arc::clone)
                .ok_or_else(|| AppError::NotFound(format!("context {context_id} not found")))?;
            let session_id = session_for_context(&tables, context_id).ok_or_else(|| {
                AppError::NotFound(format!("context {context_id} has no owning session"))
            })?;
            (context, session_id)
        };

        let page = context.new_page().await?;
        let page_id = Uuid::new_v4().to_string();

        let mut tables = self.tables.lock().await;
        tables.pages.insert(
            page_id.clone(),
            PageEntry {
                handle: page,
                context_id: context_id.to_owned(),
            },
        );
        tables
            .page_sessions
            .insert(page_id.clone(), session_id.clone());
        drop(tables);

        info!(%session_id, context_id, %page_id, "page created");
        Ok(page_id)
    }

    /// Session owning a context, derived from the ownership table.
    pub async fn derive_session_for_context(&self, context_id: &str) -> Option<String> {
        session_for_context(&*self.tables.lock().await, context_id)
    }

    /// Session owning a page, from the direct lookup table.
    pub async fn session_for_page(&self, page_id: &str) -> Option<String> {
        self.tables.lock().await.page_sessions.get(page_id).cloned()
    }

    /// Context ids owned by a session. Empty for unknown sessions.
    pub async fn list_contexts(&self, session_id: &str) -> Vec<String> {
        self.tables
            .lock()
            .await
            .session_contexts
            .get(session_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Snapshot a context's current storage state.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown context.
    pub async fn storage_state(&self, context_id: &str) -> Result<StorageState> {
        let context = {
            let tables = self.tables.lock().await;
            tables
                .contexts
                .get(context_id)
                .map(Arc::clone)
                .ok_or_else(|| AppError::NotFound(format!("context {context_id} not found")))?
        };
        context.storage_state().await
    }

    /// Close a context: persist its storage state, close it and its pages,
    /// and drop it from the session's list and durable metadata.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown context. Storage and
    /// engine failures on the teardown path are logged, not propagated.
    pub async fn close_context(&self, context_id: &str) -> Result<()> {
        let (context, session_id, pages) = {
            let mut tables = self.tables.lock().await;
            let context = tables
                .contexts
                .remove(context_id)
                .ok_or_else(|| AppError::NotFound(format!("context {context_id} not found")))?;
            let session_id = session_for_context(&tables, context_id);

            let page_ids: Vec<String> = tables
                .pages
                .iter()
                .filter(|(_, entry)| entry.context_id == context_id)
                .map(|(id, _)| id.clone())
                .collect();
            let mut pages = Vec::with_capacity(page_ids.len());
            for page_id in page_ids {
                if let Some(entry) = tables.pages.remove(&page_id) {
                    pages.push(entry.handle);
                }
                tables.page_sessions.remove(&page_id);
            }

            if let Some(ref session_id) = session_id {
                if let Some(list) = tables.session_contexts.get_mut(session_id) {
                    list.retain(|id| id != context_id);
                }
            }
            (context, session_id, pages)
        };

        if let Some(ref session_id) = session_id {
            match context.storage_state().await {
                Ok(state) => {
                    if let Err(err) = self
                        .store
                        .write_context_state(session_id, context_id, &state)
                        .await
                    {
                        warn!(%session_id, context_id, %err, "failed to persist storage state");
                    }
                }
                Err(err) => {
                    warn!(%session_id, context_id, %err, "failed to capture storage state");
                }
            }
        }

        for page in pages {
            if let Err(err) = page.close().await {
                warn!(context_id, %err, "failed to close page during context close");
            }
        }
        if let Err(err) = context.close().await {
            warn!(context_id, %err, "failed to close context");
        }

        if let Some(ref session_id) = session_id {
            if let Err(err) = self.persist_context_list(session_id).await {
                warn!(%session_id, %err, "failed to persist context list");
            }
            if let Err(err) = self.store.remove_context_state(session_id, context_id).await {
                warn!(%session_id, context_id, %err, "failed to remove storage state file");
            }
        }

        info!(context_id, "context closed");
        Ok(())
    }

    /// Close a page and drop both its table entries.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown page.
    pub async fn close_page(&self, page_id: &str) -> Result<()> {
        let entry = {
            let mut tables = self.tables.lock().await;
            let entry = tables
                .pages
                .remove(page_id)
                .ok_or_else(|| AppError::NotFound(format!("page {page_id} not found")))?;
            tables.page_sessions.remove(page_id);
            entry
        };
        if let Err(err) = entry.handle.close().await {
            warn!(page_id, %err, "failed to close page");
        }
        info!(page_id, "page closed");
        Ok(())
    }

    /// Resolve a page id to its live handle.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` for an unknown page.
    pub async fn page(&self, page_id: &str) -> Result<Arc<dyn PageHandle>> {
        let tables = self.tables.lock().await;
        tables
            .pages
            .get(page_id)
            .map(|entry| Arc::clone(&entry.handle))
            .ok_or_else(|| AppError::NotFound(format!("page {page_id} not found")))
    }

    /// Tear down everything the registry holds for a session: persist every
    /// context's storage state, close the connection, and drain all four
    /// tables to a consistent empty state.
    ///
    /// Returns the accumulated non-fatal teardown failures. Idempotent: a
    /// second call for the same session finds nothing and returns empty.
    pub async fn cleanup_session(&self, session_id: &str) -> Vec<String> {
        let mut warnings = Vec::new();

        let (connection, contexts, pages) = {
            let mut tables = self.tables.lock().await;
            let connection = tables.connections.remove(session_id);

            let context_ids = tables
                .session_contexts
                .remove(session_id)
                .unwrap_or_default();
            let mut contexts = Vec::with_capacity(context_ids.len());
            for context_id in context_ids {
                if let Some(handle) = tables.contexts.remove(&context_id) {
                    contexts.push((context_id, handle));
                }
            }

            let page_ids: Vec<String> = tables
                .page_sessions
                .iter()
                .filter(|(_, owner)| owner.as_str() == session_id)
                .map(|(id, _)| id.clone())
                .collect();
            let mut pages = Vec::with_capacity(page_ids.len());
            for page_id in page_ids {
                if let Some(entry) = tables.pages.remove(&page_id) {
                    pages.push(entry.handle);
                }
                tables.page_sessions.remove(&page_id);
            }

            (connection, contexts, pages)
        };

        // Flush storage state before anything is closed.
        for (context_id, context) in &contexts {
            match context.storage_state().await {
                Ok(state) => {
                    if let Err(err) = self
                        .store
                        .write_context_state(session_id, context_id, &state)
                        .await
                    {
                        warnings.push(format!("persist {context_id}: {err}"));
                    }
                }
                Err(err) => warnings.push(format!("snapshot {context_id}: {err}")),
            }
        }

        for page in pages {
            if let Err(err) = page.close().await {
                warnings.push(format!("close page: {err}"));
            }
        }
        for (context_id, context) in contexts {
            if let Err(err) = context.close().await {
                warnings.push(format!("close {context_id}: {err}"));
            }
        }
        if let Some(ConnectionPhase::Connected(browser)) = connection {
            if let Err(err) = browser.close().await {
                warnings.push(format!("close connection: {err}"));
            }
        }

        if !warnings.is_empty() {
            warn!(
                session_id,
                count = warnings.len(),
                "session cleanup completed with warnings"
            );
        }
        info!(session_id, "session cleaned up");
        warnings
    }
}

/// Disconnect observer installed on every connection: schedules full session
/// cleanup when the automation connection ends unexpectedly.
fn disconnect_observer(registry: &Weak<BrowserRegistry>, session_id: String) {
    let Some(registry) = registry.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        if registry.is_connected(&session_id).await {
            warn!(%session_id, "browser disconnected; cleaning up session");
            let _ = registry.cleanup_session(&session_id).await;
        }
    });
}
