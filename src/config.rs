//! Engine configuration, persisted as TOML.

use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::formula::{MAX_ATTRIBUTES_CEILING, Minimizer};

/// Errors from loading, saving or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("invalid configuration: {message}")]
    #[diagnostic(
        code(rulegraph::config::invalid),
        help("Check the configuration values. {message}")
    )]
    Invalid { message: String },

    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(rulegraph::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {path}")]
    #[diagnostic(
        code(rulegraph::config::parse),
        help("Check the TOML syntax. Known keys: `data_dir`, `max_attributes`. {message}")
    )]
    Parse { path: String, message: String },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(rulegraph::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Configuration for the rulegraph engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Data directory for the durable store. `None` keeps the graph in memory.
    pub data_dir: Option<PathBuf>,
    /// Largest attribute domain a single formula may reference.
    pub max_attributes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_attributes: Minimizer::DEFAULT_MAX_ATTRIBUTES,
        }
    }
}

impl EngineConfig {
    /// In-memory config with default limits.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable config rooted at `data_dir`.
    pub fn persistent(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attributes == 0 || self.max_attributes > MAX_ATTRIBUTES_CEILING {
            return Err(ConfigError::Invalid {
                message: format!(
                    "max_attributes must be between 1 and {MAX_ATTRIBUTES_CEILING}, got {}",
                    self.max_attributes
                ),
            });
        }
        Ok(())
    }

    pub fn minimizer(&self) -> Minimizer {
        Minimizer::new(self.max_attributes)
    }

    /// Load from a TOML file. Missing keys take their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
