//! Storage-state snapshot types.
//!
//! Mirrors the storage-state JSON shape used by browser automation tooling:
//! cookies plus per-origin local storage. Snapshots round-trip through serde
//! without loss or reordering so a seeded context reads back exactly what
//! was written.

use serde::{Deserialize, Serialize};

/// A single cookie within a storage-state snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// Host the cookie belongs to.
    pub domain: String,
    /// Path scope.
    pub path: String,
    /// Expiry as seconds since the epoch; -1.0 for session cookies.
    #[serde(default = "session_expiry")]
    pub expires: f64,
    /// Whether the cookie is HTTP-only.
    #[serde(default)]
    pub http_only: bool,
    /// Whether the cookie requires a secure channel.
    #[serde(default)]
    pub secure: bool,
    /// SameSite policy: `Strict`, `Lax`, or `None`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub same_site: Option<String>,
}

fn session_expiry() -> f64 {
    -1.0
}

/// One `name=value` local-storage entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalStorageEntry {
    /// Storage key.
    pub name: String,
    /// Storage value.
    pub value: String,
}

/// Local-storage contents for a single origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OriginState {
    /// Origin URL, e.g. `https://example.com`.
    pub origin: String,
    /// Entries in insertion order.
    #[serde(default)]
    pub local_storage: Vec<LocalStorageEntry>,
}

/// Serialized cookies and per-origin local storage for one context.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageState {
    /// All cookies in the context's jar.
    #[serde(default)]
    pub cookies: Vec<Cookie>,
    /// Per-origin local storage.
    #[serde(default)]
    pub origins: Vec<OriginState>,
}

impl StorageState {
    /// Whether the snapshot carries no cookies and no origins.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() && self.origins.is_empty()
    }
}
