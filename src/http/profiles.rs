//! Named persistent-profile import and export.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::{ApiError, ApiResult, AppState};
use crate::models::dto::ActionResponse;
use crate::AppError;

/// `POST /profiles/import` — upload an archive as a named profile.
///
/// Multipart fields: `name` (text) and `file` (the zip archive).
pub async fn import_profile(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ActionResponse>> {
    let mut name: Option<String> = None;
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError(AppError::Config(format!("invalid multipart body: {err}"))))?
    {
        match field.name() {
            Some("name") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ApiError(AppError::Config(format!("bad name field: {err}"))))?;
                name = Some(value);
            }
            Some("file") => {
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError(AppError::Config(format!("bad file field: {err}"))))?;
                bytes = Some(data.to_vec());
            }
            _ => {}
        }
    }

    let name = name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError(AppError::Config("file and name required".into())))?;
    let bytes = bytes.ok_or_else(|| ApiError(AppError::Config("file and name required".into())))?;

    state.store.import_profile(&name, bytes).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `GET /profiles/{name}/export` — download a profile as a zip archive.
pub async fn export_profile(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Response> {
    let Some(bytes) = state.store.export_profile(&name).await? else {
        return Err(ApiError(AppError::NotFound(format!(
            "profile {name} not found"
        ))));
    };
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{name}.zip\""),
            ),
        ],
        bytes,
    )
        .into_response())
}
