//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Requested session, context, or page does not exist.
    NotFound(String),
    /// Operation against a session with no live worker or browser connection.
    NotConnected(String),
    /// The underlying automation engine rejected a command.
    Automation(String),
    /// Container or image provisioning failure.
    Provision(String),
    /// Durable-storage or network I/O failure during a best-effort operation.
    Transport(String),
    /// Caller failed the shared-secret gate.
    Unauthorized(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::NotConnected(msg) => write!(f, "not connected: {msg}"),
            Self::Automation(msg) => write!(f, "automation: {msg}"),
            Self::Provision(msg) => write!(f, "provision: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Io(format!("json: {err}"))
    }
}
