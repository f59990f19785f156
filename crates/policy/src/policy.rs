//! Per-unit policy evaluation.

use crate::PolicyDirective;

/// Live grant flags of one resolution unit, as read from the grant store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnitStatus {
    pub granted: bool,
    pub user_fixed: bool,
    pub policy_fixed: bool,
}

impl UnitStatus {
    pub fn is_fixed(&self) -> bool {
        self.user_fixed || self.policy_fixed
    }
}

/// What the evaluator must do with a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Fixed by an earlier session: report the existing grant state, never prompt.
    Fixed { granted: bool },
    /// Grant the affected set, then mark policy-fixed.
    ///
    /// Always writes: unit flags are "any member granted", which says nothing
    /// about the requested capability in a partially granted group.
    AutoGrant,
    /// Revoke (if `write`), then mark policy-fixed.
    AutoDeny { write: bool },
    /// Already granted under no directive: grant the affected set silently.
    AlreadyGranted,
    /// Ask the operator.
    Prompt,
}

impl Verdict {
    pub fn needs_prompt(&self) -> bool {
        matches!(self, Verdict::Prompt)
    }
}

/// Decide how a unit is resolved.
///
/// Fixed units are checked before the directive, so a directive changed after a
/// unit was fixed does not affect it.
pub fn evaluate(directive: PolicyDirective, status: UnitStatus) -> Verdict {
    if status.is_fixed() {
        return Verdict::Fixed {
            granted: status.granted,
        };
    }

    match directive {
        PolicyDirective::AutoGrant => Verdict::AutoGrant,
        PolicyDirective::AutoDeny => Verdict::AutoDeny {
            write: status.granted,
        },
        PolicyDirective::None if status.granted => Verdict::AlreadyGranted,
        PolicyDirective::None => Verdict::Prompt,
    }
}
