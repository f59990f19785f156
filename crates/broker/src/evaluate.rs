//! Applying the device policy and live grant state to each relevant unit.

use crate::model::{ApplicationId, CapabilityId};
use crate::queue::{Lifecycle, ResolutionQueue};
use crate::resolve::RelevantUnit;
use crate::split::SplitExpander;
use crate::traits::GrantStore;
use crate::unit::Unit;
use indexmap::{IndexMap, IndexSet};
use policy::{PolicyDirective, Verdict};
use tracing::{debug, warn};

/// Units that need the operator, and units settled without one.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub queue: ResolutionQueue,
    pub resolved: IndexMap<String, Lifecycle>,
}

pub struct Evaluator<'a> {
    pub application: &'a ApplicationId,
    pub grants: &'a dyn GrantStore,
    pub expander: &'a SplitExpander<'a>,
    pub directive: PolicyDirective,
}

impl Evaluator<'_> {
    /// Settle or enqueue every unit, in order.
    ///
    /// A unit whose flags cannot be read is skipped; its slots fall back to the
    /// store at aggregation. A failed write settles the unit as denied.
    pub fn evaluate(&self, units: IndexMap<String, RelevantUnit>) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for (key, relevant) in units {
            let flags = match relevant.unit.flags(self.application, self.grants) {
                Ok(flags) => flags,
                Err(e) => {
                    warn!(unit = %key, error = %e, "failed to read grant flags; skipping unit");
                    continue;
                }
            };
            let affected = self.expander.affected_by(&relevant.requested);
            let verdict = policy::evaluate(self.directive, flags.into());
            debug!(unit = %key, ?verdict, affected = affected.len(), "evaluated unit");

            let lifecycle = match verdict {
                Verdict::Fixed { granted } => Lifecycle::terminal(granted),
                Verdict::AutoGrant => self.apply_policy(&relevant.unit, &affected, true, true),
                Verdict::AutoDeny { write } => self.apply_policy(&relevant.unit, &affected, false, write),
                Verdict::AlreadyGranted => {
                    // Split replacements may still be missing.
                    let ids: Vec<CapabilityId> = affected.into_iter().collect();
                    match self.grants.grant(self.application, &ids, false) {
                        Ok(()) => Lifecycle::Granted,
                        Err(e) => {
                            warn!(unit = %key, error = %e, "grant write failed");
                            Lifecycle::Denied
                        }
                    }
                }
                Verdict::Prompt => {
                    evaluation.queue.enqueue(relevant.unit, affected);
                    continue;
                }
            };
            evaluation.resolved.insert(key, lifecycle);
        }

        evaluation
    }

    fn apply_policy(
        &self,
        unit: &Unit,
        affected: &IndexSet<CapabilityId>,
        grant: bool,
        write: bool,
    ) -> Lifecycle {
        if write {
            let ids: Vec<CapabilityId> = affected.iter().cloned().collect();
            let written = if grant {
                self.grants.grant(self.application, &ids, true)
            } else {
                self.grants.revoke(self.application, &ids, true)
            };
            if let Err(e) = written {
                warn!(unit = %unit.key, error = %e, "policy write failed");
                return Lifecycle::Denied;
            }
        }
        for id in &unit.scope {
            if let Err(e) = self.grants.set_policy_fixed(self.application, id) {
                warn!(unit = %unit.key, capability = %id, error = %e, "failed to pin policy flag");
            }
        }
        Lifecycle::terminal(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Granularity, SessionConfig};
    use crate::grants::MemoryGrantStore;
    use crate::model::{ApplicationModel, GroupInfo};
    use storage::GrantFlags;

    fn model() -> ApplicationModel {
        let camera = GroupInfo::new("CAMERA");
        let mic = GroupInfo::new("MICROPHONE");
        ApplicationModel::new("app", 30)
            .declare("CAM", Some(&camera))
            .declare("CAM_AUDIO", Some(&camera))
            .declare("MIC", Some(&mic))
    }

    fn units(model: &ApplicationModel, ids: &[&str]) -> IndexMap<String, RelevantUnit> {
        let mut units = IndexMap::new();
        for id in ids {
            let id = CapabilityId::from(*id);
            let Some(group) = model.group_of(&id) else {
                continue;
            };
            let unit = Unit::owning(Granularity::Group, &id, group);
            units
                .entry(unit.key.clone())
                .or_insert_with(|| RelevantUnit {
                    unit,
                    requested: Vec::new(),
                })
                .requested
                .push(id);
        }
        units
    }

    fn run(grants: &MemoryGrantStore, directive: PolicyDirective, ids: &[&str]) -> Evaluation {
        let model = model();
        let expander = SplitExpander::new(&model, Vec::new(), SessionConfig::default());
        let application = ApplicationId::from("app");
        Evaluator {
            application: &application,
            grants,
            expander: &expander,
            directive,
        }
        .evaluate(units(&model, ids))
    }

    #[test]
    fn ungranted_units_are_queued() {
        let grants = MemoryGrantStore::new();
        let evaluation = run(&grants, PolicyDirective::None, &["CAM", "MIC", "CAM_AUDIO"]);

        assert_eq!(evaluation.queue.keys(), vec!["CAMERA", "MICROPHONE"]);
        assert!(evaluation.resolved.is_empty());
        let camera = evaluation.queue.active().unwrap();
        assert_eq!(camera.entry.affected.len(), 2);
    }

    #[test]
    fn auto_grant_writes_and_pins_policy() {
        let grants = MemoryGrantStore::new();
        let evaluation = run(&grants, PolicyDirective::AutoGrant, &["CAM", "MIC"]);

        assert!(evaluation.queue.is_empty());
        assert_eq!(evaluation.resolved["CAMERA"], Lifecycle::Granted);
        let flags = grants.snapshot(&"app".into(), &"CAM".into());
        assert!(flags.granted && flags.policy_fixed);
        // Unrequested group members are pinned but not granted.
        let audio = grants.snapshot(&"app".into(), &"CAM_AUDIO".into());
        assert!(!audio.granted && audio.policy_fixed);
    }

    #[test]
    fn auto_grant_writes_requested_member_of_partially_granted_group() {
        let grants = MemoryGrantStore::new().with_granted("app", "CAM_AUDIO");
        let evaluation = run(&grants, PolicyDirective::AutoGrant, &["CAM"]);

        assert_eq!(evaluation.resolved["CAMERA"], Lifecycle::Granted);
        let flags = grants.snapshot(&"app".into(), &"CAM".into());
        assert!(flags.granted && flags.policy_fixed);
    }

    #[test]
    fn auto_deny_revokes_granted_unit() {
        let grants = MemoryGrantStore::new().with_granted("app", "MIC");
        let evaluation = run(&grants, PolicyDirective::AutoDeny, &["MIC"]);

        assert_eq!(evaluation.resolved["MICROPHONE"], Lifecycle::Denied);
        let flags = grants.snapshot(&"app".into(), &"MIC".into());
        assert!(!flags.granted && flags.policy_fixed);
    }

    #[test]
    fn fixed_unit_is_never_rewritten() {
        let grants = MemoryGrantStore::new().with_flags(
            "app",
            "MIC",
            GrantFlags {
                user_fixed: true,
                ..Default::default()
            },
        );
        let evaluation = run(&grants, PolicyDirective::AutoGrant, &["MIC"]);

        assert_eq!(evaluation.resolved["MICROPHONE"], Lifecycle::Denied);
        assert!(!grants.snapshot(&"app".into(), &"MIC".into()).granted);
    }

    #[test]
    fn already_granted_unit_is_settled_without_prompt() {
        let grants = MemoryGrantStore::new().with_granted("app", "CAM");
        let evaluation = run(&grants, PolicyDirective::None, &["CAM"]);

        assert!(evaluation.queue.is_empty());
        assert_eq!(evaluation.resolved["CAMERA"], Lifecycle::Granted);
    }
}
