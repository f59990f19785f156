//! Device policy directive and its provider seam.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Global administrator override for runtime capability requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyDirective {
    /// No override: the operator decides.
    #[default]
    None,
    /// Grant every eligible request without prompting.
    AutoGrant,
    /// Deny every eligible request without prompting.
    AutoDeny,
}

/// Source of the device policy directive.
///
/// Read once per session. An error is fatal to session start.
pub trait DirectiveProvider: Send + Sync {
    fn directive(&self) -> Result<PolicyDirective>;
}

/// Device policy loaded from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevicePolicy {
    #[serde(default)]
    pub directive: PolicyDirective,
}

impl DevicePolicy {
    pub fn new(directive: PolicyDirective) -> Self {
        Self { directive }
    }

    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }
}

impl DirectiveProvider for DevicePolicy {
    fn directive(&self) -> Result<PolicyDirective> {
        Ok(self.directive)
    }
}
