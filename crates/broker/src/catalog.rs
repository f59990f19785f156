//! TOML-backed capability registry and application model loader.

use crate::model::{
    ApplicationId, ApplicationModel, CapabilityDescriptor, CapabilityId, GroupInfo, SplitRule,
};
use crate::traits::{CapabilityRegistry, LoadError, ModelLoader};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A capability definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityEntry {
    pub id: CapabilityId,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(flatten)]
    pub descriptor: CapabilityDescriptor,
}

/// An installed application and what it declares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationEntry {
    pub id: ApplicationId,
    #[serde(default)]
    pub label: Option<String>,
    pub model_version: u32,
    #[serde(default)]
    pub instant: bool,
    #[serde(default)]
    pub declares: Vec<CapabilityId>,
}

/// Catalog contents as written in TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default, rename = "capability")]
    pub capabilities: Vec<CapabilityEntry>,

    #[serde(default, rename = "group")]
    pub groups: Vec<GroupInfo>,

    #[serde(default, rename = "split")]
    pub splits: Vec<SplitRule>,

    #[serde(default, rename = "application")]
    pub applications: Vec<ApplicationEntry>,
}

/// Validated, indexed catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    capabilities: HashMap<CapabilityId, CapabilityEntry>,
    groups: HashMap<String, GroupInfo>,
    splits: Vec<SplitRule>,
    applications: HashMap<ApplicationId, ApplicationEntry>,
}

impl Catalog {
    /// Load a catalog from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Catalog(format!("{}: {e}", path.as_ref().display())))?;
        Self::parse(&content)
    }

    /// Parse a catalog from a TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(toml).map_err(|e| Error::Catalog(e.to_string()))?;
        Self::try_from(file)
    }

    pub fn application(&self, id: &ApplicationId) -> Option<&ApplicationEntry> {
        self.applications.get(id)
    }
}

impl TryFrom<CatalogFile> for Catalog {
    type Error = Error;

    fn try_from(file: CatalogFile) -> Result<Self> {
        let mut groups = HashMap::new();
        for group in file.groups {
            if groups.contains_key(&group.name) {
                return Err(Error::Catalog(format!("duplicate group {}", group.name)));
            }
            groups.insert(group.name.clone(), group);
        }

        let mut capabilities = HashMap::new();
        for entry in file.capabilities {
            if let Some(group) = &entry.group {
                if !groups.contains_key(group) {
                    return Err(Error::Catalog(format!(
                        "capability {} references unknown group {group}",
                        entry.id
                    )));
                }
            }
            if capabilities.contains_key(&entry.id) {
                return Err(Error::Catalog(format!("duplicate capability {}", entry.id)));
            }
            capabilities.insert(entry.id.clone(), entry);
        }

        let mut applications = HashMap::new();
        for app in file.applications {
            if applications.contains_key(&app.id) {
                return Err(Error::Catalog(format!("duplicate application {}", app.id)));
            }
            applications.insert(app.id.clone(), app);
        }

        Ok(Self {
            capabilities,
            groups,
            splits: file.splits,
            applications,
        })
    }
}

impl CapabilityRegistry for Catalog {
    fn descriptor(&self, id: &CapabilityId) -> Option<CapabilityDescriptor> {
        self.capabilities.get(id).map(|entry| entry.descriptor.clone())
    }

    fn split_rules(&self) -> Vec<SplitRule> {
        self.splits.clone()
    }
}

impl ModelLoader for Catalog {
    fn load(&self, application: &ApplicationId) -> std::result::Result<ApplicationModel, LoadError> {
        let entry = self
            .applications
            .get(application)
            .ok_or_else(|| LoadError::NotFound(application.clone()))?;

        let mut model = ApplicationModel::new(entry.id.clone(), entry.model_version)
            .with_label(entry.label.clone().unwrap_or_else(|| entry.id.to_string()))
            .with_instant(entry.instant);

        for id in &entry.declares {
            if id.as_str().trim().is_empty() {
                return Err(LoadError::Malformed(format!(
                    "{application} declares a blank capability"
                )));
            }
            // Capabilities missing from the registry are declared without a group.
            let group = self
                .capabilities
                .get(id)
                .and_then(|c| c.group.as_deref())
                .and_then(|name| self.groups.get(name));
            model = model.declare(id.clone(), group);
        }

        Ok(model)
    }
}
