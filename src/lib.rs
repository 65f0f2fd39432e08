#![forbid(unsafe_code)]

pub mod browser;
pub mod config;
pub mod errors;
pub mod heartbeat;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
