//! Console logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the configured minimum level applies
//! to every target.

use tracing::Level;
use tracing_subscriber::{
    EnvFilter, Registry, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::errors::SyncError;

/// Parses a level name such as `"info"` or `"WARN"`.
pub fn string_to_level(level: &str) -> Option<Level> {
    match level.trim().to_ascii_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}

/// Installs the global subscriber. Unknown level names fall back to INFO.
pub fn init_logging(min_level: &str) -> Result<(), SyncError> {
    let level = string_to_level(min_level).map_or(LevelFilter::INFO, LevelFilter::from_level);
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    Registry::default()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_ansi(true),
        )
        .try_init()
        .map_err(|e| SyncError::Logging(e.to_string()))
}
