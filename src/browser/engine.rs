//! Narrow contract over the browser automation engine.
//!
//! The registry drives everything through these traits so the engine stays
//! swappable: production connects over CDP ([`CdpEngine`](crate::browser::cdp::CdpEngine)),
//! tests use in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::storage::StorageState;
use crate::Result;

/// Callback invoked exactly once when a connection is lost or closed.
pub type DisconnectHook = Box<dyn FnOnce() + Send + 'static>;

/// Factory for live browser connections.
#[async_trait]
pub trait AutomationEngine: Send + Sync {
    /// Open a remote automation connection to a worker endpoint.
    ///
    /// `on_disconnect` fires when the connection ends for any reason,
    /// including an orderly close.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the endpoint cannot be reached
    /// or the handshake fails.
    async fn connect(
        &self,
        endpoint: &str,
        on_disconnect: DisconnectHook,
    ) -> Result<Arc<dyn BrowserHandle>>;
}

/// One live browser connection for one session.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    /// Create an isolated browsing context, optionally seeded with a
    /// storage-state snapshot.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn new_context(&self, seed: Option<StorageState>) -> Result<Arc<dyn ContextHandle>>;

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure; callers on cleanup
    /// paths accumulate rather than propagate.
    async fn close(&self) -> Result<()>;
}

/// One isolated cookie/storage jar within a connection.
#[async_trait]
pub trait ContextHandle: Send + Sync {
    /// Open a new page in this context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn new_page(&self) -> Result<Arc<dyn PageHandle>>;

    /// Snapshot the context's cookies and per-origin local storage.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn storage_state(&self) -> Result<StorageState>;

    /// Close the context.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn close(&self) -> Result<()>;
}

/// One navigable document within a context.
#[async_trait]
pub trait PageHandle: Send + Sync {
    /// Load a URL.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on navigation failure.
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Click the first element matching the selector.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the selector does not resolve.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Type text into the first element matching the selector.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the selector does not resolve.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Capture a PNG screenshot of the viewport.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on capture failure.
    async fn screenshot(&self) -> Result<Vec<u8>>;

    /// Evaluate a JavaScript expression and return its JSON value.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when evaluation throws.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Current HTML content of the page.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn content(&self) -> Result<String>;

    /// Whether at least one element matches the selector.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on an invalid selector.
    async fn query_selector(&self, selector: &str) -> Result<bool>;

    /// Number of elements matching the selector.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on an invalid selector.
    async fn query_selector_all(&self, selector: &str) -> Result<usize>;

    /// Text content of the first matching element, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the selector does not resolve.
    async fn element_text(&self, selector: &str) -> Result<Option<String>>;

    /// Attribute value of the first matching element, if present.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` when the selector does not resolve.
    async fn element_attribute(&self, selector: &str, attribute: &str)
        -> Result<Option<String>>;

    /// Close the page.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Automation` on engine failure.
    async fn close(&self) -> Result<()>;
}
