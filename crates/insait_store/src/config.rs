//! Configuration for the persistence layer.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory name under the per-user local data directory.
pub const APP_DIR_NAME: &str = "InsaitVideoPlayer";

/// Name of the optional configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Suffixes of auxiliary files that share the store file's base name.
pub const AUX_FILE_SUFFIXES: &[&str] = &["-journal", "-log"];

/// Returns the per-user application data directory.
///
/// Falls back to the working directory when the platform has no notion of a
/// local data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Configuration for the session and history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the key file, the store file and this config.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Watch history configuration.
    #[serde(default)]
    pub history: HistoryConfig,

    /// File naming configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::in_dir(default_data_dir())
    }
}

impl StoreConfig {
    /// Default configuration rooted at `data_dir`.
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            history: HistoryConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load configuration from `<data_dir>/config.toml`.
    ///
    /// A missing file yields the defaults.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            let content = fs::read_to_string(&path)
                .map_err(|e| StoreError::Config(format!("failed to read config: {}", e)))?;
            toml::from_str::<StoreConfig>(&content)
                .map_err(|e| StoreError::Config(format!("failed to parse config: {}", e)))?
        } else {
            StoreConfig::in_dir(data_dir)
        };
        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration, falling back to defaults on any error.
    pub fn load_or_default(data_dir: &Path) -> Self {
        match Self::load(data_dir) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unusable store configuration");
                Self::in_dir(data_dir)
            }
        }
    }

    /// Save configuration to `<data_dir>/config.toml`.
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| StoreError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(self.data_dir.join(CONFIG_FILE_NAME), content)
            .map_err(|e| StoreError::Config(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Rejects values the store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.history.max_items == 0 {
            return Err(StoreError::Config(
                "history.max_items must be at least 1".to_string(),
            ));
        }
        if self.storage.database_file.is_empty() || self.storage.key_file.is_empty() {
            return Err(StoreError::Config("file names must not be empty".to_string()));
        }
        Ok(())
    }

    /// Path of the encrypted store file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.database_file)
    }

    /// Path of the protected key file.
    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.key_file)
    }

    /// Paths of auxiliary files removed together with the store file.
    pub fn auxiliary_paths(&self) -> Vec<PathBuf> {
        AUX_FILE_SUFFIXES
            .iter()
            .map(|suffix| {
                self.data_dir
                    .join(format!("{}{}", self.storage.database_file, suffix))
            })
            .collect()
    }
}

/// Watch history configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Maximum number of history entries kept (default: 100).
    pub max_items: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_items: 100 }
    }
}

/// File naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Store file name (default: `sessions.db`).
    pub database_file: String,

    /// Protected key file name (default: `session.key`).
    pub key_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: "sessions.db".to_string(),
            key_file: "session.key".to_string(),
        }
    }
}
