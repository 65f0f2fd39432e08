//! Request and response DTOs for the HTTP surface.

use serde::{Deserialize, Serialize};

use crate::models::storage::StorageState;

/// Envelope returned by JSON action endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ActionResponse {
    /// Whether the action succeeded.
    pub success: bool,
    /// Action result, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure message when `success` is false.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResponse {
    /// Successful response with a result payload.
    #[must_use]
    pub fn ok(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Successful response with no payload.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self {
            success: true,
            result: None,
            error: None,
        }
    }

    /// Failed response carrying an error message.
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(message.into()),
        }
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    /// Unique identifier of this orchestrator instance.
    pub orchestrator_id: String,
}

/// Body of `POST /sessions/{id}/contexts`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct CreateContextRequest {
    /// Optional storage-state seed for the new context.
    pub storage_state: Option<StorageState>,
}

/// Body of `POST /pages/{id}/navigate`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct NavigateRequest {
    /// Absolute URL to load.
    pub url: String,
}

/// Body of `POST /pages/{id}/click`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ClickRequest {
    /// CSS selector of the element to click.
    pub selector: String,
}

/// Body of `POST /pages/{id}/type`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TypeRequest {
    /// CSS selector of the element to type into.
    pub selector: String,
    /// Text to type.
    pub text: String,
}

/// Body of `POST /pages/{id}/evaluate`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EvaluateRequest {
    /// JavaScript expression evaluated in the page.
    pub script: String,
}

/// Body of `POST /pages/{id}/querySelector` and `querySelectorAll`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct QuerySelectorRequest {
    /// CSS selector to match.
    pub selector: String,
}

/// Body of `POST /pages/{id}/elementText`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ElementTextRequest {
    /// CSS selector of the element to read.
    pub selector: String,
}

/// Body of `POST /pages/{id}/elementAttribute`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ElementAttributeRequest {
    /// CSS selector of the element to read.
    pub selector: String,
    /// Attribute name.
    pub attribute: String,
}
