//! Session configuration.

use serde::{Deserialize, Serialize};

/// Lowest declared model version that supports runtime grants.
pub const DEFAULT_RUNTIME_MIN_VERSION: u32 = 23;

/// Highest declared model version treated as legacy (whole-group grants).
pub const DEFAULT_LEGACY_MAX_VERSION: u32 = 25;

/// Granularity of one resolution unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// One prompt per capability group.
    #[default]
    Group,
    /// One prompt per capability (regulatory mode).
    Capability,
}

/// Explicit per-session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub granularity: Granularity,

    #[serde(default = "default_runtime_min_version")]
    pub runtime_min_version: u32,

    #[serde(default = "default_legacy_max_version")]
    pub legacy_max_version: u32,
}

fn default_runtime_min_version() -> u32 {
    DEFAULT_RUNTIME_MIN_VERSION
}

fn default_legacy_max_version() -> u32 {
    DEFAULT_LEGACY_MAX_VERSION
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Group,
            runtime_min_version: DEFAULT_RUNTIME_MIN_VERSION,
            legacy_max_version: DEFAULT_LEGACY_MAX_VERSION,
        }
    }
}

impl SessionConfig {
    pub fn with_granularity(mut self, granularity: Granularity) -> Self {
        self.granularity = granularity;
        self
    }

    /// Whether an application declaring `version` gets whole-group grants.
    pub fn is_legacy(&self, version: u32) -> bool {
        self.granularity == Granularity::Group && version <= self.legacy_max_version
    }
}
