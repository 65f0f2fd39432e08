//! Optional shared-secret basic-auth gate.
//!
//! Applied uniformly to the client-facing API. `/health` stays open: the
//! worker heartbeat protocol polls it without credentials. When no secret is
//! configured the gate is disabled entirely.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::AppState;
use crate::models::dto::ActionResponse;

/// Middleware enforcing the shared secret on every route except `/health`.
pub async fn gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(ref secret) = state.config.auth_secret else {
        return next.run(request).await;
    };
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .and_then(|decoded| String::from_utf8(decoded).ok())
        .and_then(|credentials| {
            credentials
                .split_once(':')
                .map(|(_, password)| password.to_owned())
        })
        .is_some_and(|password| password == *secret);

    if authorized {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(ActionResponse::err("unauthorized")),
        )
            .into_response()
    }
}
