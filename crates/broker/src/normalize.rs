//! Request validation and deduplication.

use crate::config::SessionConfig;
use crate::model::{ApplicationModel, CapabilityId};
use crate::{Error, Result};
use indexmap::IndexMap;

/// A requested capability list, deduplicated with original positions kept.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRequest {
    original: Vec<CapabilityId>,
    positions: IndexMap<CapabilityId, Vec<usize>>,
}

impl NormalizedRequest {
    pub fn new(requested: Vec<CapabilityId>) -> Self {
        let mut positions: IndexMap<CapabilityId, Vec<usize>> = IndexMap::new();
        for (index, id) in requested.iter().enumerate() {
            positions.entry(id.clone()).or_default().push(index);
        }
        Self {
            original: requested,
            positions,
        }
    }

    /// Reject blank capability names.
    pub fn validate(&self) -> Result<()> {
        match self.original.iter().position(|id| id.as_str().trim().is_empty()) {
            Some(index) => Err(Error::RequestInvalid(format!(
                "blank capability at position {index}"
            ))),
            None => Ok(()),
        }
    }

    pub fn original(&self) -> &[CapabilityId] {
        &self.original
    }

    /// Distinct ids in first-seen order.
    pub fn unique(&self) -> impl Iterator<Item = &CapabilityId> {
        self.positions.keys()
    }

    /// Distinct ids with every position they occupy in the original request.
    pub fn positions(&self) -> impl Iterator<Item = (&CapabilityId, &[usize])> {
        self.positions.iter().map(|(id, at)| (id, at.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }
}

/// Check that the application may take part in runtime grants at all.
pub fn admit(model: &ApplicationModel, config: &SessionConfig) -> Result<()> {
    if !model.has_declarations() {
        return Err(Error::RequestInvalid(format!(
            "{} declares no capabilities",
            model.id
        )));
    }
    if model.model_version < config.runtime_min_version {
        return Err(Error::RequestInvalid(format!(
            "{} declares model version {} (runtime grants need {})",
            model.id, model.model_version, config.runtime_min_version
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[&str]) -> Vec<CapabilityId> {
        raw.iter().map(|s| CapabilityId::from(*s)).collect()
    }

    #[test]
    fn dedup_keeps_first_seen_order_and_positions() {
        let request = NormalizedRequest::new(ids(&["B", "A", "B", "C", "A"]));

        let unique: Vec<_> = request.unique().map(CapabilityId::as_str).collect();
        assert_eq!(unique, ["B", "A", "C"]);

        let positions: Vec<_> = request.positions().map(|(_, at)| at.to_vec()).collect();
        assert_eq!(positions, vec![vec![0, 2], vec![1, 4], vec![3]]);
        assert_eq!(request.len(), 5);
    }

    #[test]
    fn blank_ids_are_invalid() {
        let request = NormalizedRequest::new(ids(&["CAM", "  "]));
        assert!(matches!(request.validate(), Err(Error::RequestInvalid(_))));
        assert!(NormalizedRequest::new(ids(&["CAM"])).validate().is_ok());
    }

    #[test]
    fn admit_rejects_old_or_empty_models() {
        let config = SessionConfig::default();
        let empty = ApplicationModel::new("app", 30);
        assert!(admit(&empty, &config).is_err());

        let old = ApplicationModel::new("app", 22).declare("CAM", None);
        assert!(admit(&old, &config).is_err());

        let current = ApplicationModel::new("app", 23).declare("CAM", None);
        assert!(admit(&current, &config).is_ok());
    }
}
