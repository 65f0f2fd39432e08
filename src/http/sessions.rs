//! Session lifecycle endpoints.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;

use super::{ApiResult, AppState};
use crate::models::dto::HealthResponse;
use crate::models::session::{CreateSessionRequest, Session};
use crate::AppError;

/// `GET /health` — liveness plus the orchestrator instance identity.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        orchestrator_id: state.orchestrator.orchestrator_id().to_owned(),
    })
}

/// `POST /sessions` — create an idle session. The body is optional; an
/// empty body yields default launch configuration.
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    body: axum::body::Bytes,
) -> ApiResult<Json<Session>> {
    let request: CreateSessionRequest = if body.is_empty() {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|err| AppError::Config(format!("invalid session request: {err}")))?
    };
    let session = state.orchestrator.create_session(request).await?;
    Ok(Json(session))
}

/// `POST /sessions/import` — create a session from an uploaded
/// storage-state archive.
pub async fn import_session(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<Session>> {
    let bytes = read_file_field(&mut multipart).await?;
    let session = state.orchestrator.create_session_from_archive(bytes).await?;
    Ok(Json(session))
}

/// `POST /sessions/{id}/start` — ensure the session has a running worker.
pub async fn start_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state.orchestrator.start_session(&id).await?;
    Ok(Json(session))
}

/// `DELETE /sessions/{id}` — stop the session. Idempotent; never fails the
/// caller for double-stops or unknown ids.
pub async fn stop_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    let _report = state.orchestrator.stop_session(&id).await;
    StatusCode::OK
}

/// `GET /sessions/{id}` — fetch a session record.
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Session>> {
    let session = state.orchestrator.get_session(&id).await?;
    Ok(Json(session))
}

/// Pull the `file` field out of a multipart upload.
pub(super) async fn read_file_field(multipart: &mut Multipart) -> Result<Vec<u8>, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::Config(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|err| AppError::Config(format!("failed to read upload: {err}")))?;
            return Ok(bytes.to_vec());
        }
    }
    Err(AppError::Config("no file uploaded".into()))
}
