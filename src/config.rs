//! Global configuration parsing, validation, and secret loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::{AppError, Result};

/// How page-action traffic reaches a worker container.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerAddressing {
    /// Publish the worker port on an ephemeral host port and address it
    /// via `127.0.0.1:<host-port>`.
    Published,
    /// Address the container by name on the shared network's internal DNS.
    /// Requires the orchestrator itself to run on that network.
    Internal,
}

/// Worker container tunables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Image tag for worker containers.
    #[serde(default = "default_worker_image")]
    pub image: String,
    /// Build context directory used when the image is absent.
    #[serde(default = "default_build_context")]
    pub build_context: PathBuf,
    /// Shared isolated network joined by every worker.
    #[serde(default = "default_network_name")]
    pub network_name: String,
    /// Addressing mode for reaching workers.
    #[serde(default = "default_addressing")]
    pub addressing: WorkerAddressing,
    /// Readiness poll attempts before a worker is declared failed.
    #[serde(default = "default_readiness_attempts")]
    pub readiness_attempts: u32,
    /// Delay between readiness poll attempts, in milliseconds.
    #[serde(default = "default_readiness_delay_ms")]
    pub readiness_delay_ms: u64,
    /// Connection timeout advertised to the worker, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

fn default_worker_image() -> String {
    "browser-warden-worker".into()
}

fn default_build_context() -> PathBuf {
    PathBuf::from("worker-image")
}

fn default_network_name() -> String {
    "warden-net".into()
}

fn default_addressing() -> WorkerAddressing {
    WorkerAddressing::Published
}

fn default_readiness_attempts() -> u32 {
    30
}

fn default_readiness_delay_ms() -> u64 {
    1000
}

fn default_connection_timeout_ms() -> u64 {
    60_000
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            image: default_worker_image(),
            build_context: default_build_context(),
            network_name: default_network_name(),
            addressing: default_addressing(),
            readiness_attempts: default_readiness_attempts(),
            readiness_delay_ms: default_readiness_delay_ms(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
///
/// Every field carries a default so the server boots with no config file at
/// all. The shared secret is loaded at runtime from the environment, never
/// from TOML.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// HTTP listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Root directory for durable session and profile state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Default idle timeout for active sessions, in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_seconds: u64,
    /// Interval between idle-reaper sweeps, in seconds.
    #[serde(default = "default_reaper_interval")]
    pub reaper_interval_seconds: u64,
    /// Hostname workers use to reach the orchestrator from inside a container.
    #[serde(default = "default_orchestrator_host")]
    pub orchestrator_host: String,
    /// Worker container settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Shared secret for the basic-auth gate (populated at runtime).
    #[serde(skip)]
    pub auth_secret: Option<String>,
}

fn default_port() -> u16 {
    3000
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_session_timeout() -> u64 {
    1800
}

fn default_reaper_interval() -> u64 {
    60
}

fn default_orchestrator_host() -> String {
    "host.docker.internal".into()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            data_dir: default_data_dir(),
            session_timeout_seconds: default_session_timeout(),
            reaper_interval_seconds: default_reaper_interval(),
            orchestrator_host: default_orchestrator_host(),
            worker: WorkerConfig::default(),
            auth_secret: None,
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the optional shared secret from the `WARDEN_AUTH_SECRET`
    /// environment variable. An unset or empty variable disables the
    /// auth gate entirely.
    pub fn load_auth_secret(&mut self) {
        match env::var("WARDEN_AUTH_SECRET") {
            Ok(secret) if !secret.is_empty() => self.auth_secret = Some(secret),
            Ok(_) => {
                warn!("WARDEN_AUTH_SECRET is empty; auth gate disabled");
                self.auth_secret = None;
            }
            Err(_) => self.auth_secret = None,
        }
    }

    /// Directory holding per-session durable state.
    #[must_use]
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Directory holding named persistent profiles.
    #[must_use]
    pub fn profiles_dir(&self) -> PathBuf {
        self.data_dir.join("profiles")
    }

    /// Directory holding uploaded session archives prior to extraction.
    #[must_use]
    pub fn archives_dir(&self) -> PathBuf {
        self.data_dir.join("archives")
    }

    fn validate(&self) -> Result<()> {
        if self.session_timeout_seconds == 0 {
            return Err(AppError::Config(
                "session_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.reaper_interval_seconds == 0 {
            return Err(AppError::Config(
                "reaper_interval_seconds must be greater than zero".into(),
            ));
        }
        if self.worker.readiness_attempts == 0 {
            return Err(AppError::Config(
                "worker.readiness_attempts must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
