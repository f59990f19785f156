//! Expansion of one grant or revoke to every affected capability.

use crate::config::SessionConfig;
use crate::model::{ApplicationModel, CapabilityId, SplitRule};
use indexmap::IndexSet;

/// Computes the affected set of a grant or revoke for one application.
#[derive(Debug, Clone)]
pub struct SplitExpander<'a> {
    model: &'a ApplicationModel,
    rules: Vec<SplitRule>,
    config: SessionConfig,
}

impl<'a> SplitExpander<'a> {
    pub fn new(model: &'a ApplicationModel, rules: Vec<SplitRule>, config: SessionConfig) -> Self {
        Self {
            model,
            rules,
            config,
        }
    }

    /// Capabilities affected by resolving `target`.
    ///
    /// Legacy applications get the whole owning group. Everyone else gets the
    /// target plus the replacements of every split rule rooted at it whose
    /// threshold lies above both the legacy ceiling and the declared version.
    /// Replacements the application does not declare are left out.
    pub fn affected(&self, target: &CapabilityId) -> IndexSet<CapabilityId> {
        if self.config.is_legacy(self.model.model_version) {
            if let Some(group) = self.model.group_of(target) {
                return group.members.iter().cloned().collect();
            }
        }

        let mut affected = IndexSet::new();
        affected.insert(target.clone());
        for rule in &self.rules {
            if rule.root != *target
                || rule.threshold <= self.config.legacy_max_version
                || self.model.model_version >= rule.threshold
            {
                continue;
            }
            for replacement in &rule.replacements {
                if self.model.declares(replacement) {
                    affected.insert(replacement.clone());
                }
            }
        }
        affected
    }

    /// Union of the affected sets of several targets.
    pub fn affected_by<'t>(
        &self,
        targets: impl IntoIterator<Item = &'t CapabilityId>,
    ) -> IndexSet<CapabilityId> {
        let mut affected = IndexSet::new();
        for target in targets {
            affected.extend(self.affected(target));
        }
        affected
    }
}
