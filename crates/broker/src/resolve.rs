//! Mapping of requested capabilities to resolution units.

use crate::config::Granularity;
use crate::model::{ApplicationModel, CapabilityGroup, CapabilityId};
use crate::normalize::NormalizedRequest;
use crate::traits::CapabilityRegistry;
use crate::unit::Unit;
use indexmap::IndexMap;
use tracing::debug;

/// A unit that takes part in the session, with the requested ids it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelevantUnit {
    pub unit: Unit,
    pub requested: Vec<CapabilityId>,
}

/// Relevant units keyed by unit key, in first-encounter order of the request.
///
/// Unknown, undeclared and ungrouped ids are dropped, as are ids whose group
/// cannot be granted at runtime. Their slots keep whatever the store says.
pub fn resolve(
    request: &NormalizedRequest,
    model: &ApplicationModel,
    registry: &dyn CapabilityRegistry,
    granularity: Granularity,
) -> IndexMap<String, RelevantUnit> {
    let mut units: IndexMap<String, RelevantUnit> = IndexMap::new();

    for id in request.unique() {
        let Some(descriptor) = registry.descriptor(id) else {
            debug!(capability = %id, "unknown capability");
            continue;
        };
        let Some(group) = model.group_of(id) else {
            debug!(capability = %id, "capability not declared in any group");
            continue;
        };
        if !is_grantable(group, model, registry) {
            debug!(capability = %id, group = group.name(), "group not grantable");
            continue;
        }
        if granularity == Granularity::Capability && !descriptor.is_grantable_for(model) {
            debug!(capability = %id, "capability not grantable");
            continue;
        }

        let unit = Unit::owning(granularity, id, group);
        units
            .entry(unit.key.clone())
            .or_insert_with(|| RelevantUnit {
                unit,
                requested: Vec::new(),
            })
            .requested
            .push(id.clone());
    }

    units
}

fn is_grantable(
    group: &CapabilityGroup,
    model: &ApplicationModel,
    registry: &dyn CapabilityRegistry,
) -> bool {
    group.members.iter().any(|member| {
        registry
            .descriptor(member)
            .is_some_and(|d| d.is_grantable_for(model))
    })
}
