//! Unified path management for sessync configuration and data files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/sessync/           # Config directory
//! └── config.toml              # Runtime configuration
//!
//! ~/.local/share/sessync/      # Data directory (overridable via `data_dir`)
//! └── history/                 # One JSON file per session key
//!     ├── alpha.json
//!     └── build%20bot.json
//! ```

use std::path::{Path, PathBuf};

use sessync_core::SessyncError;
use thiserror::Error;

const APP_DIR: &str = "sessync";
const HISTORY_DIR: &str = "history";
const CONFIG_FILE: &str = "config.toml";

/// Errors that can occur during path resolution.
#[derive(Debug, Error)]
pub enum PathError {
    #[error("Cannot find the platform config directory")]
    ConfigDirNotFound,
    #[error("Cannot find the platform data directory")]
    DataDirNotFound,
}

impl From<PathError> for SessyncError {
    fn from(err: PathError) -> Self {
        SessyncError::config(err.to_string())
    }
}

pub struct SessyncPaths;

impl SessyncPaths {
    /// Returns `~/.config/sessync` (or the platform equivalent).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::ConfigDirNotFound)
    }

    /// Returns `~/.local/share/sessync` (or the platform equivalent).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::DataDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    pub fn history_dir(base_dir: &Path) -> PathBuf {
        base_dir.join(HISTORY_DIR)
    }
}

/// Encodes a session key into a file stem.
///
/// ASCII alphanumerics, `-` and `_` are kept; every other byte becomes `%XX`.
/// The mapping is injective, so distinct keys never share a file.
pub fn encode_session_key(key: &str) -> String {
    if key.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(byte as char);
        } else {
            encoded.push_str(&format!("%{:02X}", byte));
        }
    }
    encoded
}
