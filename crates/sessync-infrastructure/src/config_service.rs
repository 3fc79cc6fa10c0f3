//! Configuration service implementation.
//!
//! Loads [`SyncConfig`] from `~/.config/sessync/config.toml` (or an explicit
//! path) and resolves the directories derived from it.

use std::path::{Path, PathBuf};

use sessync_core::SessyncError;
use sessync_core::config::SyncConfig;
use sessync_core::error::Result;

use crate::paths::SessyncPaths;

/// Loads and resolves runtime configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    /// Uses the platform config file location.
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_path: SessyncPaths::config_file()?,
        })
    }

    pub fn with_path(config_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Reads the config file. A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load(&self) -> Result<SyncConfig> {
        match std::fs::read_to_string(&self.config_path) {
            Ok(content) => {
                tracing::debug!(
                    "[Config] Loaded configuration from {}",
                    self.config_path.display()
                );
                SyncConfig::from_toml_str(&content)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[Config] No config at {}, using defaults",
                    self.config_path.display()
                );
                Ok(SyncConfig::default())
            }
            Err(e) => Err(SessyncError::io(format!(
                "Failed to read {}: {}",
                self.config_path.display(),
                e
            ))),
        }
    }

    /// Returns the configured data directory, or the platform default.
    pub fn resolve_data_dir(config: &SyncConfig) -> Result<PathBuf> {
        match &config.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(SessyncPaths::data_dir()?),
        }
    }
}
