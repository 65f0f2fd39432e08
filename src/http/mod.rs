//! HTTP surface: router assembly, shared state, and error mapping.

pub mod auth;
pub mod browser;
pub mod profiles;
pub mod sessions;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::models::dto::ActionResponse;
use crate::orchestrator::Orchestrator;
use crate::persistence::SessionStore;
use crate::{AppError, Result};

/// Shared state handed to every handler.
pub struct AppState {
    /// Session orchestrator (owns the registry and runtime underneath).
    pub orchestrator: Arc<Orchestrator>,
    /// Durable store, for profile import/export.
    pub store: Arc<SessionStore>,
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
}

/// Error wrapper mapping the domain taxonomy onto HTTP responses.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(ActionResponse::err(self.0.to_string()))).into_response()
    }
}

/// Handler result alias.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Assemble the full router over the shared state.
#[must_use]
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(sessions::health))
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/import", post(sessions::import_session))
        .route("/sessions/{id}/start", post(sessions::start_session))
        .route(
            "/sessions/{id}",
            get(sessions::get_session).delete(sessions::stop_session),
        )
        .route(
            "/sessions/{id}/contexts",
            get(browser::list_contexts).post(browser::create_context),
        )
        .route("/contexts/{id}/pages", post(browser::create_page))
        .route("/contexts/{id}/storageState", get(browser::storage_state))
        .route("/contexts/{id}", delete(browser::close_context))
        .route("/pages/{id}", delete(browser::close_page))
        .route("/pages/{id}/navigate", post(browser::navigate))
        .route("/pages/{id}/click", post(browser::click))
        .route("/pages/{id}/type", post(browser::type_text))
        .route("/pages/{id}/evaluate", post(browser::evaluate))
        .route("/pages/{id}/querySelector", post(browser::query_selector))
        .route(
            "/pages/{id}/querySelectorAll",
            post(browser::query_selector_all),
        )
        .route("/pages/{id}/elementText", post(browser::element_text))
        .route(
            "/pages/{id}/elementAttribute",
            post(browser::element_attribute),
        )
        .route("/pages/{id}/screenshot", get(browser::screenshot))
        .route("/pages/{id}/content", get(browser::content))
        .route("/profiles/import", post(profiles::import_profile))
        .route("/profiles/{name}/export", get(profiles::export_profile))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::gate,
        ))
        .with_state(state)
}

/// Bind and serve the HTTP surface until the token is cancelled.
///
/// # Errors
///
/// Returns `AppError::Config` when the listener cannot bind.
pub async fn serve(state: Arc<AppState>, cancel: CancellationToken) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {addr}: {err}")))?;
    info!(%addr, "orchestrator listening");
    let app = router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|err| AppError::Config(format!("server error: {err}")))
}
