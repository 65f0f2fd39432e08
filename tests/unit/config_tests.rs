//! Unit tests for configuration parsing, defaults, and validation.

use std::path::PathBuf;

use browser_warden::config::{GlobalConfig, WorkerAddressing};

#[test]
fn empty_toml_yields_defaults() {
    let config = GlobalConfig::from_toml_str("").expect("defaults");
    assert_eq!(config.port, 3000);
    assert_eq!(config.data_dir, PathBuf::from("data"));
    assert_eq!(config.session_timeout_seconds, 1800);
    assert_eq!(config.reaper_interval_seconds, 60);
    assert_eq!(config.orchestrator_host, "host.docker.internal");
    assert_eq!(config.worker.image, "browser-warden-worker");
    assert_eq!(config.worker.network_name, "warden-net");
    assert_eq!(config.worker.addressing, WorkerAddressing::Published);
    assert_eq!(config.worker.readiness_attempts, 30);
    assert_eq!(config.worker.readiness_delay_ms, 1000);
    assert!(config.auth_secret.is_none());
}

#[test]
fn full_toml_parses() {
    let raw = r#"
port = 8080
data_dir = "/var/lib/warden"
session_timeout_seconds = 600
reaper_interval_seconds = 30
orchestrator_host = "warden-host"

[worker]
image = "my-worker:latest"
build_context = "images/worker"
network_name = "my-net"
addressing = "internal"
readiness_attempts = 10
readiness_delay_ms = 500
connection_timeout_ms = 30000
"#;
    let config = GlobalConfig::from_toml_str(raw).expect("parse");
    assert_eq!(config.port, 8080);
    assert_eq!(config.worker.addressing, WorkerAddressing::Internal);
    assert_eq!(config.worker.image, "my-worker:latest");
    assert_eq!(config.worker.connection_timeout_ms, 30_000);
}

#[test]
fn zero_session_timeout_is_rejected() {
    let result = GlobalConfig::from_toml_str("session_timeout_seconds = 0");
    assert!(result.is_err());
}

#[test]
fn zero_reaper_interval_is_rejected() {
    let result = GlobalConfig::from_toml_str("reaper_interval_seconds = 0");
    assert!(result.is_err());
}

#[test]
fn zero_readiness_attempts_are_rejected() {
    let result = GlobalConfig::from_toml_str("[worker]\nreadiness_attempts = 0");
    assert!(result.is_err());
}

#[test]
fn invalid_toml_is_rejected() {
    let result = GlobalConfig::from_toml_str("port = \"not a number\"");
    assert!(result.is_err());
}

#[test]
fn layout_directories_derive_from_data_dir() {
    let config = GlobalConfig::from_toml_str("data_dir = \"/srv/warden\"").expect("parse");
    assert_eq!(config.sessions_dir(), PathBuf::from("/srv/warden/sessions"));
    assert_eq!(config.profiles_dir(), PathBuf::from("/srv/warden/profiles"));
    assert_eq!(config.archives_dir(), PathBuf::from("/srv/warden/archives"));
}
