//! Resolution units: what one prompt decides.

use crate::config::Granularity;
use crate::model::{ApplicationId, CapabilityGroup, CapabilityId};
use crate::traits::GrantStore;
use crate::Result;
use serde::{Deserialize, Serialize};

/// A group, or a single capability in regulatory mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Group name or capability id, depending on granularity.
    pub key: String,
    /// Owning group, for presentation metadata.
    pub group: String,
    /// Capabilities whose flags describe the unit.
    pub scope: Vec<CapabilityId>,
}

impl Unit {
    /// The unit that owns `id` under the given granularity.
    pub fn owning(granularity: Granularity, id: &CapabilityId, group: &CapabilityGroup) -> Self {
        match granularity {
            Granularity::Group => Self {
                key: group.name().to_string(),
                group: group.name().to_string(),
                scope: group.members.clone(),
            },
            Granularity::Capability => Self {
                key: id.to_string(),
                group: group.name().to_string(),
                scope: vec![id.clone()],
            },
        }
    }

    /// Live flags; a unit carries a flag when any capability in scope does.
    pub fn flags(&self, application: &ApplicationId, grants: &dyn GrantStore) -> Result<UnitFlags> {
        let mut flags = UnitFlags::default();
        for id in &self.scope {
            let current = grants.flags(application, id)?;
            flags.granted |= current.granted;
            flags.user_set |= current.user_set;
            flags.user_fixed |= current.user_fixed;
            flags.policy_fixed |= current.policy_fixed;
        }
        Ok(flags)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitFlags {
    pub granted: bool,
    pub user_set: bool,
    pub user_fixed: bool,
    pub policy_fixed: bool,
}

impl From<UnitFlags> for policy::UnitStatus {
    fn from(flags: UnitFlags) -> Self {
        Self {
            granted: flags.granted,
            user_fixed: flags.user_fixed,
            policy_fixed: flags.policy_fixed,
        }
    }
}
