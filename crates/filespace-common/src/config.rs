//! Configuration types for the filespace directory
//!
//! Loaded from a TOML file; every field has a default so a partial (or
//! missing) file is valid.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub directory: DirectoryConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Parse configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.directory.max_filespaces == 0 {
            return Err(Error::configuration(
                "directory.max_filespaces must be greater than zero",
            ));
        }
        if self.store.write_buffer_size == 0 {
            return Err(Error::configuration(
                "store.write_buffer_size must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Directory cache configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Maximum number of filespaces the shared directory can hold
    #[serde(default = "default_max_filespaces")]
    pub max_filespaces: usize,
    /// Fail a fix when the persisted record has vanished instead of skipping
    /// the store write
    #[serde(default)]
    pub require_persisted_record: bool,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_filespaces: default_max_filespaces(),
            require_persisted_record: false,
        }
    }
}

/// Persisted record store configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding the record log
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// fsync after every log append
    #[serde(default)]
    pub sync_on_write: bool,
    /// Buffer size for log writes
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
    /// Default durability of corrective updates
    #[serde(default)]
    pub flush_on_fix: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sync_on_write: false,
            write_buffer_size: default_write_buffer_size(),
            flush_on_fix: false,
        }
    }
}

/// Logging configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_filespaces() -> usize {
    16
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/filespace")
}

fn default_write_buffer_size() -> usize {
    64 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.directory.max_filespaces, 16);
        assert!(!config.directory.require_persisted_record);
        assert!(!config.store.flush_on_fix);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml_str(
            r#"
            [directory]
            max_filespaces = 4
            require_persisted_record = true

            [store]
            data_dir = "/tmp/fs"
            flush_on_fix = true
            "#,
        )
        .unwrap();

        assert_eq!(config.directory.max_filespaces, 4);
        assert!(config.directory.require_persisted_record);
        assert_eq!(config.store.data_dir, PathBuf::from("/tmp/fs"));
        assert!(config.store.flush_on_fix);
        assert_eq!(config.store.write_buffer_size, 64 * 1024);
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let err = Config::from_toml_str("[directory]\nmax_filespaces = 0\n").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        assert!(Config::from_toml_str("[directory\n").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("filespace.toml");
        std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.logging.level, "debug");

        assert!(Config::from_file(dir.path().join("missing.toml")).is_err());
    }
}
