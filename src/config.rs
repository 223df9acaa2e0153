//! Application configuration.
//!
//! Configuration is stored in TOML format at `$TENDERS_CONFIG`, or
//! `~/.config/tenders/config.toml` (or the platform equivalent). A missing
//! file means defaults.
//!
//! # Example Configuration
//!
//! ```toml
//! [export]
//! delimiter = ";"
//! escape_newlines = false
//! true_literal = "yes"
//! false_literal = "no"
//! batch_size = 512
//!
//! [analytics]
//! top_n = 20
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::export::CodecOptions;
use crate::export::writer::DEFAULT_BATCH_SIZE;

pub const CONFIG_ENV: &str = "TENDERS_CONFIG";

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub export: ExportConfig,
    pub analytics: AnalyticsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    #[serde(flatten)]
    pub codec: CodecOptions,
    /// Documents flattened per parallel batch.
    pub batch_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            codec: CodecOptions::default(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Entries kept in top-N lists.
    pub top_n: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { top_n: 10 }
    }
}

impl AppConfig {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load from a specific path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    ///
    /// - `$TENDERS_CONFIG` when set
    /// - `$XDG_CONFIG_HOME/tenders/config.toml`
    /// - the platform config dir otherwise
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            return Ok(PathBuf::from(xdg_config).join("tenders").join("config.toml"));
        }
        directories::ProjectDirs::from("org", "tenders", "tenders")
            .map(|dirs| dirs.config_dir().join("config.toml"))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.export
            .codec
            .validate()
            .map_err(ConfigError::Validation)?;
        if self.export.batch_size == 0 {
            return Err(ConfigError::Validation("batch_size must be positive".into()));
        }
        if self.analytics.top_n == 0 {
            return Err(ConfigError::Validation("top_n must be positive".into()));
        }
        Ok(())
    }
}
