//! CLI commands.

pub mod history;
pub mod reset;
pub mod session;
pub mod status;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use insait_store::{default_data_dir, SessionManager, StoreConfig};
use std::path::Path;

/// Load the configuration for `data_dir` and open the store.
pub fn open_manager(data_dir: Option<&Path>) -> Result<SessionManager> {
    let dir = data_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(default_data_dir);
    let config = StoreConfig::load(&dir)
        .with_context(|| format!("Invalid configuration in {}", dir.display()))?;
    tracing::debug!(data_dir = %dir.display(), "Opening session store");
    Ok(SessionManager::open(config))
}

/// Render Unix milliseconds in local time.
pub fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Render a playback time in milliseconds as `h:mm:ss`.
pub fn format_duration(millis: i64) -> String {
    let total = millis.max(0) / 1000;
    format!("{}:{:02}:{:02}", total / 3600, (total / 60) % 60, total % 60)
}
