//! Recovery configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SQLSALVAGE_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use sqlsalvage_repair::pager::{MAX_PAGE_SIZE, MIN_PAGE_SIZE};
use std::path::{Path, PathBuf};

/// Tool configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Recovery pass configuration.
    pub recovery: RecoveryConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SQLSALVAGE_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();

        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.recovery.apply_env_overrides();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.recovery.validate()
    }
}

/// What to recover and how far.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Path of the main database file. The WAL is `<database>-wal`.
    pub database: PathBuf,
    /// Page size of the database in bytes.
    pub page_size: u32,
    /// Recover only the first N frames.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame: Option<u32>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::new(),
            page_size: 4096,
            max_frame: None,
        }
    }
}

impl RecoveryConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("SQLSALVAGE_DATABASE") {
            self.database = PathBuf::from(path);
        }

        if let Ok(size) = std::env::var("SQLSALVAGE_PAGE_SIZE") {
            if let Ok(n) = size.parse() {
                self.page_size = n;
            }
        }

        if let Ok(max) = std::env::var("SQLSALVAGE_MAX_FRAME") {
            if let Ok(n) = max.parse() {
                self.max_frame = Some(n);
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "recovery.database not set (SQLSALVAGE_DATABASE)".to_string(),
            ));
        }

        if !self.page_size.is_power_of_two()
            || !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size)
        {
            return Err(ConfigError::ValidationError(format!(
                "recovery.page_size must be a power of two between {} and {}, got {}",
                MIN_PAGE_SIZE, MAX_PAGE_SIZE, self.page_size
            )));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(_, e) => Some(e),
            _ => None,
        }
    }
}
