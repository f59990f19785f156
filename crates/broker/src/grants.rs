//! Grant store implementations.

use crate::model::{ApplicationId, CapabilityId};
use crate::traits::GrantStore;
use crate::{Error, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use storage::{FixedFlag, GrantFlags, GrantTable};

/// In-process grant store.
#[derive(Debug, Default)]
pub struct MemoryGrantStore {
    flags: RwLock<HashMap<(ApplicationId, CapabilityId), GrantFlags>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the flags of one capability.
    pub fn with_flags(
        self,
        application: impl Into<ApplicationId>,
        id: impl Into<CapabilityId>,
        flags: GrantFlags,
    ) -> Self {
        self.flags
            .write()
            .insert((application.into(), id.into()), flags);
        self
    }

    /// Seed a capability as granted.
    pub fn with_granted(
        self,
        application: impl Into<ApplicationId>,
        id: impl Into<CapabilityId>,
    ) -> Self {
        self.with_flags(
            application,
            id,
            GrantFlags {
                granted: true,
                ..Default::default()
            },
        )
    }

    pub fn snapshot(&self, application: &ApplicationId, id: &CapabilityId) -> GrantFlags {
        self.flags
            .read()
            .get(&(application.clone(), id.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn write(&self, application: &ApplicationId, ids: &[CapabilityId], granted: bool, by_policy: bool) {
        let mut flags = self.flags.write();
        for id in ids {
            let entry = flags.entry((application.clone(), id.clone())).or_default();
            entry.granted = granted;
            if by_policy {
                entry.policy_fixed = true;
            } else {
                entry.user_set = true;
            }
        }
    }
}

impl GrantStore for MemoryGrantStore {
    fn flags(&self, application: &ApplicationId, id: &CapabilityId) -> Result<GrantFlags> {
        Ok(self.snapshot(application, id))
    }

    fn grant(&self, application: &ApplicationId, ids: &[CapabilityId], fixed_by_policy: bool) -> Result<()> {
        self.write(application, ids, true, fixed_by_policy);
        Ok(())
    }

    fn revoke(&self, application: &ApplicationId, ids: &[CapabilityId], fixed_by_policy: bool) -> Result<()> {
        self.write(application, ids, false, fixed_by_policy);
        Ok(())
    }

    fn set_user_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        self.flags
            .write()
            .entry((application.clone(), id.clone()))
            .or_default()
            .user_fixed = true;
        Ok(())
    }

    fn set_policy_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        self.flags
            .write()
            .entry((application.clone(), id.clone()))
            .or_default()
            .policy_fixed = true;
        Ok(())
    }
}

impl GrantStore for GrantTable {
    fn flags(&self, application: &ApplicationId, id: &CapabilityId) -> Result<GrantFlags> {
        GrantTable::flags(self, application.as_str(), id.as_str()).map_err(store_error)
    }

    fn grant(&self, application: &ApplicationId, ids: &[CapabilityId], fixed_by_policy: bool) -> Result<()> {
        self.set_granted(application.as_str(), as_strs(ids).as_slice(), true, fixed_by_policy)
            .map_err(store_error)
    }

    fn revoke(&self, application: &ApplicationId, ids: &[CapabilityId], fixed_by_policy: bool) -> Result<()> {
        self.set_granted(application.as_str(), as_strs(ids).as_slice(), false, fixed_by_policy)
            .map_err(store_error)
    }

    fn set_user_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        self.mark_fixed(application.as_str(), id.as_str(), FixedFlag::User)
            .map_err(store_error)
    }

    fn set_policy_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        self.mark_fixed(application.as_str(), id.as_str(), FixedFlag::Policy)
            .map_err(store_error)
    }
}

fn as_strs(ids: &[CapabilityId]) -> Vec<&str> {
    ids.iter().map(CapabilityId::as_str).collect()
}

fn store_error(e: storage::Error) -> Error {
    Error::GrantStore(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_marks_user_set_or_policy_fixed() {
        let app = ApplicationId::from("app");
        let store = MemoryGrantStore::new();
        store.grant(&app, &["CAM".into()], false).unwrap();
        store.revoke(&app, &["MIC".into()], true).unwrap();

        let cam = store.flags(&app, &"CAM".into()).unwrap();
        assert!(cam.granted && cam.user_set && !cam.policy_fixed);
        let mic = store.flags(&app, &"MIC".into()).unwrap();
        assert!(!mic.granted && mic.policy_fixed && !mic.user_set);
    }

    #[test]
    fn grant_table_implements_grant_store() {
        let app = ApplicationId::from("app");
        let table = GrantTable::in_memory().unwrap();
        let store: &dyn GrantStore = &table;

        store.grant(&app, &["CAM".into(), "CAM_AUDIO".into()], false).unwrap();
        store.set_user_fixed(&app, &"CAM".into()).unwrap();

        assert!(store.is_granted(&app, &"CAM_AUDIO".into()).unwrap());
        assert!(store.flags(&app, &"CAM".into()).unwrap().user_fixed);
        assert!(!store.is_granted(&app, &"MIC".into()).unwrap());
    }
}
