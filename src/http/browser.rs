//! Context, page, and page-action endpoints.
//!
//! Every page action resolves page → session through the registry's direct
//! lookup and touches the owning session so activity defers the idle reaper.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use super::{ApiResult, AppState};
use crate::models::dto::{
    ActionResponse, ClickRequest, CreateContextRequest, ElementAttributeRequest,
    ElementTextRequest, EvaluateRequest, NavigateRequest, QuerySelectorRequest, TypeRequest,
};
use crate::models::storage::StorageState;

async fn touch_by_page(state: &AppState, page_id: &str) {
    if let Some(session_id) = state.orchestrator.registry().session_for_page(page_id).await {
        state.orchestrator.touch_session(&session_id).await;
    }
}

/// `GET /sessions/{id}/contexts` — context ids owned by the session.
pub async fn list_contexts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    let contexts = state.orchestrator.registry().list_contexts(&id).await;
    Json(json!({ "contexts": contexts }))
}

/// `POST /sessions/{id}/contexts` — create a context, optionally seeded
/// with a storage-state snapshot. Establishes the browser connection
/// lazily when this is the session's first browser operation.
pub async fn create_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: axum::body::Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let seed = if body.is_empty() {
        None
    } else {
        let request: CreateContextRequest = serde_json::from_slice(&body)
            .map_err(|err| crate::AppError::Config(format!("invalid context request: {err}")))?;
        request.storage_state
    };
    state.orchestrator.ensure_connected(&id).await?;
    let context_id = state
        .orchestrator
        .registry()
        .create_context(&id, seed)
        .await?;
    state.orchestrator.touch_session(&id).await;
    Ok(Json(json!({ "context_id": context_id })))
}

/// `POST /contexts/{id}/pages` — open a page in the context.
pub async fn create_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let page_id = state.orchestrator.registry().create_page(&id).await?;
    touch_by_page(&state, &page_id).await;
    Ok(Json(json!({ "page_id": page_id })))
}

/// `GET /contexts/{id}/storageState` — current storage-state snapshot.
pub async fn storage_state(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StorageState>> {
    let snapshot = state.orchestrator.registry().storage_state(&id).await?;
    Ok(Json(snapshot))
}

/// `DELETE /contexts/{id}` — persist and close the context.
pub async fn close_context(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    state.orchestrator.registry().close_context(&id).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `DELETE /pages/{id}` — close the page.
pub async fn close_page(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    state.orchestrator.registry().close_page(&id).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `POST /pages/{id}/navigate`.
pub async fn navigate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<NavigateRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    page.navigate(&request.url).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `POST /pages/{id}/click`.
pub async fn click(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ClickRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    page.click(&request.selector).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `POST /pages/{id}/type`.
pub async fn type_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<TypeRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    page.type_text(&request.selector, &request.text).await?;
    Ok(Json(ActionResponse::ok_empty()))
}

/// `POST /pages/{id}/evaluate`.
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<EvaluateRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let value = page.evaluate(&request.script).await?;
    Ok(Json(ActionResponse::ok(value)))
}

/// `POST /pages/{id}/querySelector` — whether the selector matches.
pub async fn query_selector(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<QuerySelectorRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let found = page.query_selector(&request.selector).await?;
    Ok(Json(ActionResponse::ok(json!(found))))
}

/// `POST /pages/{id}/querySelectorAll` — number of matches.
pub async fn query_selector_all(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<QuerySelectorRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let count = page.query_selector_all(&request.selector).await?;
    Ok(Json(ActionResponse::ok(json!(count))))
}

/// `POST /pages/{id}/elementText`.
pub async fn element_text(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ElementTextRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let text = page.element_text(&request.selector).await?;
    Ok(Json(ActionResponse::ok(json!(text))))
}

/// `POST /pages/{id}/elementAttribute`.
pub async fn element_attribute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<ElementAttributeRequest>,
) -> ApiResult<Json<ActionResponse>> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let value = page
        .element_attribute(&request.selector, &request.attribute)
        .await?;
    Ok(Json(ActionResponse::ok(json!(value))))
}

/// `GET /pages/{id}/screenshot` — binary PNG response.
pub async fn screenshot(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let bytes = page.screenshot().await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "image/png")],
        bytes,
    )
        .into_response())
}

/// `GET /pages/{id}/content` — raw HTML response.
pub async fn content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    touch_by_page(&state, &id).await;
    let page = state.orchestrator.registry().page(&id).await?;
    let html = page.content().await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
        html,
    )
        .into_response())
}
