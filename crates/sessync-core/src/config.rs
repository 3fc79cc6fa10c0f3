use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SessyncError};

/// Runtime configuration, read from `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SyncConfig {
    /// Root for persisted transcripts. Falls back to the platform data dir.
    pub data_dir: Option<PathBuf>,
    /// Seconds between periodic roster reconciliations.
    pub reconcile_interval_secs: u64,
    pub default_page_size: usize,
    /// `tracing-subscriber` filter used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Record live transcript changes into the history store.
    pub persist_transcripts: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            reconcile_interval_secs: 5,
            default_page_size: 50,
            log_filter: "info".to_string(),
            persist_transcripts: true,
        }
    }
}

impl SyncConfig {
    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| SessyncError::config(format!("invalid config.toml: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reconcile_interval_secs == 0 {
            return Err(SessyncError::config(
                "reconcile_interval_secs must be greater than zero",
            ));
        }
        if self.default_page_size == 0 {
            return Err(SessyncError::config(
                "default_page_size must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = SyncConfig::from_toml_str("").unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.reconcile_interval(), Duration::from_secs(5));
    }

    #[test]
    fn partial_document_overrides_only_given_keys() {
        let config = SyncConfig::from_toml_str(
            r#"
            data_dir = "/var/lib/sessync"
            log_filter = "sessync=debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/sessync")));
        assert_eq!(config.log_filter, "sessync=debug");
        assert_eq!(config.default_page_size, 50);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = SyncConfig::from_toml_str("reconcile_interval_secs = 0").unwrap_err();
        assert!(err.is_config());
    }
}
