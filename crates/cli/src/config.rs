//! Configuration loading from permgate.toml.

use broker::{Catalog, CatalogFile, SessionConfig};
use policy::DevicePolicy;
use serde::Deserialize;
use std::path::Path;

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Device policy directive.
    #[serde(default)]
    pub policy: DevicePolicy,

    /// Session granularity and version thresholds.
    #[serde(default)]
    pub session: SessionConfig,

    /// Capabilities, groups, split rules and installed applications.
    #[serde(flatten)]
    pub catalog: CatalogFile,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Load configuration, or fall back to an empty catalog if the file is missing.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate and index the catalog tables.
    pub fn catalog(&self) -> Result<Catalog, ConfigError> {
        Catalog::try_from(self.catalog.clone()).map_err(|e| ConfigError::Catalog(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("{0}")]
    Catalog(String),
}
