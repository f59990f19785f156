//! Capability and application model types.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque name of one capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityId(String);

impl CapabilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CapabilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for CapabilityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for CapabilityId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Identifier of a requesting application.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApplicationId(String);

impl ApplicationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ApplicationId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ApplicationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Protection class of a capability. Only `Dangerous` capabilities are runtime-grantable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtectionClass {
    #[default]
    Normal,
    Dangerous,
    Signature,
}

/// Registry description of a capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    #[serde(default)]
    pub protection: ProtectionClass,
    /// Lowest declared model version for which the capability is runtime-grantable.
    #[serde(default)]
    pub min_model_version: u32,
    /// Whether instant (ephemeral) applications may hold it.
    #[serde(default)]
    pub instant: bool,
    #[serde(default)]
    pub label: Option<String>,
}

impl CapabilityDescriptor {
    pub fn dangerous() -> Self {
        Self {
            protection: ProtectionClass::Dangerous,
            ..Default::default()
        }
    }

    /// Whether an application with this model may be granted the capability at runtime.
    pub fn is_grantable_for(&self, model: &ApplicationModel) -> bool {
        self.protection == ProtectionClass::Dangerous
            && model.model_version >= self.min_model_version
            && (self.instant || !model.instant)
    }
}

/// Presentation metadata shared by every member of a capability group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl GroupInfo {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            label: name.clone(),
            description: format!("use {name}"),
            name,
            icon: None,
        }
    }
}

/// A group of capabilities the application declares, presented as one decision.
///
/// User-set and fixed flags are not stored here; they are read from the grant
/// store whenever they are needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityGroup {
    pub info: GroupInfo,
    pub members: Vec<CapabilityId>,
}

impl CapabilityGroup {
    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn contains(&self, id: &CapabilityId) -> bool {
        self.members.contains(id)
    }
}

/// Immutable snapshot of what an application declares, built once per session.
#[derive(Debug, Clone)]
pub struct ApplicationModel {
    pub id: ApplicationId,
    pub label: String,
    pub model_version: u32,
    pub instant: bool,
    declared: IndexMap<CapabilityId, Option<String>>,
    groups: IndexMap<String, CapabilityGroup>,
}

impl ApplicationModel {
    pub fn new(id: impl Into<ApplicationId>, model_version: u32) -> Self {
        let id = id.into();
        Self {
            label: id.to_string(),
            id,
            model_version,
            instant: false,
            declared: IndexMap::new(),
            groups: IndexMap::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_instant(mut self, instant: bool) -> Self {
        self.instant = instant;
        self
    }

    /// Declare a capability, optionally as a member of a group.
    pub fn declare(mut self, id: impl Into<CapabilityId>, group: Option<&GroupInfo>) -> Self {
        let id = id.into();
        if let Some(info) = group {
            let entry = self
                .groups
                .entry(info.name.clone())
                .or_insert_with(|| CapabilityGroup {
                    info: info.clone(),
                    members: Vec::new(),
                });
            if !entry.members.contains(&id) {
                entry.members.push(id.clone());
            }
        }
        self.declared
            .insert(id, group.map(|info| info.name.clone()));
        self
    }

    pub fn declares(&self, id: &CapabilityId) -> bool {
        self.declared.contains_key(id)
    }

    pub fn declared(&self) -> impl Iterator<Item = &CapabilityId> {
        self.declared.keys()
    }

    pub fn has_declarations(&self) -> bool {
        !self.declared.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&CapabilityGroup> {
        self.groups.get(name)
    }

    /// The group owning a declared capability.
    pub fn group_of(&self, id: &CapabilityId) -> Option<&CapabilityGroup> {
        let name = self.declared.get(id)?.as_deref()?;
        self.groups.get(name)
    }

    pub fn groups(&self) -> impl Iterator<Item = &CapabilityGroup> {
        self.groups.values()
    }
}

/// Version-dependent expansion of a capability into replacement capabilities.
///
/// Applications declaring a model version below `threshold` that are granted or
/// revoked `root` are also granted or revoked every replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    pub root: CapabilityId,
    pub threshold: u32,
    pub replacements: Vec<CapabilityId>,
}

/// Final outcome of one requested capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Granted,
    Denied,
}

impl Outcome {
    pub fn from_granted(granted: bool) -> Self {
        if granted {
            Outcome::Granted
        } else {
            Outcome::Denied
        }
    }

    pub fn is_granted(self) -> bool {
        self == Outcome::Granted
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Granted => f.pad("GRANTED"),
            Outcome::Denied => f.pad("DENIED"),
        }
    }
}

/// One slot of the result vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSlot {
    pub capability: CapabilityId,
    pub outcome: Outcome,
}

/// Outcomes in original request order, one slot per requested capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultVector(Vec<ResultSlot>);

impl ResultVector {
    pub fn new(slots: Vec<ResultSlot>) -> Self {
        Self(slots)
    }

    /// Every requested capability denied.
    pub fn denied(requested: &[CapabilityId]) -> Self {
        Self(
            requested
                .iter()
                .map(|capability| ResultSlot {
                    capability: capability.clone(),
                    outcome: Outcome::Denied,
                })
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn slots(&self) -> &[ResultSlot] {
        &self.0
    }

    pub fn outcomes(&self) -> Vec<Outcome> {
        self.0.iter().map(|slot| slot.outcome).collect()
    }
}

impl From<&ResultVector> for Vec<storage::RecordedResult> {
    fn from(results: &ResultVector) -> Self {
        results
            .slots()
            .iter()
            .map(|slot| storage::RecordedResult {
                capability: slot.capability.to_string(),
                granted: slot.outcome.is_granted(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> GroupInfo {
        GroupInfo::new("CAMERA_GROUP")
    }

    #[test]
    fn declare_builds_groups_in_declaration_order() {
        let model = ApplicationModel::new("app", 30)
            .declare("CAM", Some(&camera()))
            .declare("INTERNET", None)
            .declare("CAM_AUDIO", Some(&camera()));

        let group = model.group_of(&"CAM_AUDIO".into()).unwrap();
        assert_eq!(group.members, vec!["CAM".into(), "CAM_AUDIO".into()]);
        assert!(model.declares(&"INTERNET".into()));
        assert!(model.group_of(&"INTERNET".into()).is_none());
        assert!(model.group_of(&"MIC".into()).is_none());
    }

    #[test]
    fn grantability_respects_class_version_and_instant() {
        let model = ApplicationModel::new("app", 26).with_instant(true);

        let normal = CapabilityDescriptor::default();
        assert!(!normal.is_grantable_for(&model));

        let not_instant = CapabilityDescriptor::dangerous();
        assert!(!not_instant.is_grantable_for(&model));

        let too_new = CapabilityDescriptor {
            min_model_version: 29,
            instant: true,
            ..CapabilityDescriptor::dangerous()
        };
        assert!(!too_new.is_grantable_for(&model));

        let ok = CapabilityDescriptor {
            instant: true,
            ..CapabilityDescriptor::dangerous()
        };
        assert!(ok.is_grantable_for(&model));
    }

    #[test]
    fn denied_vector_keeps_length_and_order() {
        let requested: Vec<CapabilityId> = vec!["A".into(), "B".into(), "A".into()];
        let results = ResultVector::denied(&requested);
        assert_eq!(results.len(), 3);
        assert_eq!(results.slots()[2].capability, "A".into());
        assert!(results.outcomes().iter().all(|o| *o == Outcome::Denied));
    }
}
