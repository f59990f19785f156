//! Interactive resolution queue.
//!
//! Entries are kept in insertion order. The active entry is always the first
//! one still `Unresolved`; entries are never skipped or reordered, and a
//! resolved entry never changes again. The queue is plain data, so a
//! serialized copy restores the same active entry.

use crate::ProtocolViolation;
use crate::model::CapabilityId;
use crate::unit::Unit;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Lifecycle of one resolution unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Unresolved,
    Granted,
    Denied,
}

impl Lifecycle {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Lifecycle::Unresolved)
    }

    pub fn terminal(granted: bool) -> Self {
        if granted {
            Lifecycle::Granted
        } else {
            Lifecycle::Denied
        }
    }

    /// Transition on a decision. Terminal states accept nothing.
    pub fn resolve(self, granted: bool) -> Option<Lifecycle> {
        match (self, granted) {
            (Lifecycle::Unresolved, true) => Some(Lifecycle::Granted),
            (Lifecycle::Unresolved, false) => Some(Lifecycle::Denied),
            (Lifecycle::Granted | Lifecycle::Denied, _) => None,
        }
    }
}

/// A unit waiting for, or having received, an operator decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub unit: Unit,
    pub affected: IndexSet<CapabilityId>,
    pub lifecycle: Lifecycle,
}

/// The entry currently shown to the operator.
#[derive(Debug, Clone, Copy)]
pub struct Active<'a> {
    pub index: usize,
    pub total: usize,
    pub entry: &'a QueueEntry,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionQueue {
    entries: IndexMap<String, QueueEntry>,
}

impl ResolutionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, or widen the affected set of one already queued.
    pub fn enqueue(&mut self, unit: Unit, affected: IndexSet<CapabilityId>) {
        match self.entries.get_mut(&unit.key) {
            Some(entry) => entry.affected.extend(affected),
            None => {
                self.entries.insert(
                    unit.key.clone(),
                    QueueEntry {
                        unit,
                        affected,
                        lifecycle: Lifecycle::Unresolved,
                    },
                );
            }
        }
    }

    pub fn active(&self) -> Option<Active<'_>> {
        self.entries
            .values()
            .enumerate()
            .find(|(_, entry)| !entry.lifecycle.is_terminal())
            .map(|(index, entry)| Active {
                index,
                total: self.entries.len(),
                entry,
            })
    }

    /// The entry a decision for `key` would resolve, if `key` is the active entry.
    pub fn check(&self, key: &str) -> Result<&QueueEntry, ProtocolViolation> {
        let Some(active) = self.active() else {
            return Err(if self.entries.contains_key(key) {
                ProtocolViolation::AlreadyResolved(key.to_string())
            } else {
                ProtocolViolation::Completed(key.to_string())
            });
        };
        if active.entry.unit.key == key {
            return Ok(active.entry);
        }
        Err(match self.entries.get(key) {
            Some(entry) if entry.lifecycle.is_terminal() => {
                ProtocolViolation::AlreadyResolved(key.to_string())
            }
            _ => ProtocolViolation::NotActive {
                active: active.entry.unit.key.clone(),
                received: key.to_string(),
            },
        })
    }

    /// Resolve the active entry.
    ///
    /// A key that is not the active entry is rejected and nothing changes.
    pub fn resolve(&mut self, key: &str, granted: bool) -> Result<&QueueEntry, ProtocolViolation> {
        self.check(key)?;
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| ProtocolViolation::Completed(key.to_string()))?;
        entry.lifecycle = entry
            .lifecycle
            .resolve(granted)
            .ok_or_else(|| ProtocolViolation::AlreadyResolved(key.to_string()))?;
        Ok(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.values()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// No entry is left unresolved.
    pub fn is_drained(&self) -> bool {
        self.active().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(key: &str) -> Unit {
        Unit {
            key: key.to_string(),
            group: key.to_string(),
            scope: vec![CapabilityId::from(key)],
        }
    }

    fn affected(raw: &[&str]) -> IndexSet<CapabilityId> {
        raw.iter().map(|s| CapabilityId::from(*s)).collect()
    }

    fn queue(keys: &[&str]) -> ResolutionQueue {
        let mut queue = ResolutionQueue::new();
        for key in keys {
            queue.enqueue(unit(key), affected(&[key]));
        }
        queue
    }

    #[test]
    fn lifecycle_is_one_way() {
        assert_eq!(Lifecycle::Unresolved.resolve(true), Some(Lifecycle::Granted));
        assert_eq!(Lifecycle::Unresolved.resolve(false), Some(Lifecycle::Denied));
        assert_eq!(Lifecycle::Granted.resolve(false), None);
        assert_eq!(Lifecycle::Denied.resolve(true), None);
    }

    #[test]
    fn enqueue_merges_affected_sets() {
        let mut queue = ResolutionQueue::new();
        queue.enqueue(unit("G1"), affected(&["A"]));
        queue.enqueue(unit("G1"), affected(&["B", "A"]));

        assert_eq!(queue.len(), 1);
        let active = queue.active().unwrap();
        assert_eq!(active.entry.affected, affected(&["A", "B"]));
    }

    #[test]
    fn active_advances_in_insertion_order() {
        let mut queue = queue(&["G1", "G2", "G3"]);

        let first = queue.active().unwrap();
        assert_eq!((first.index, first.total), (0, 3));
        assert_eq!(first.entry.unit.key, "G1");

        queue.resolve("G1", true).unwrap();
        assert_eq!(queue.active().unwrap().entry.unit.key, "G2");
        queue.resolve("G2", false).unwrap();
        let last = queue.active().unwrap();
        assert_eq!((last.index, last.entry.unit.key.as_str()), (2, "G3"));
        queue.resolve("G3", true).unwrap();
        assert!(queue.is_drained());
    }

    #[test]
    fn decision_for_later_entry_is_rejected() {
        let mut queue = queue(&["G1", "G2"]);
        let before = queue.clone();

        let err = queue.resolve("G2", true).unwrap_err();
        assert_eq!(
            err,
            ProtocolViolation::NotActive {
                active: "G1".into(),
                received: "G2".into()
            }
        );
        assert_eq!(queue, before);
    }

    #[test]
    fn decision_for_resolved_or_unknown_entry_is_rejected() {
        let mut queue = queue(&["G1", "G2"]);
        queue.resolve("G1", false).unwrap();

        assert_eq!(
            queue.resolve("G1", true).unwrap_err(),
            ProtocolViolation::AlreadyResolved("G1".into())
        );
        queue.resolve("G2", true).unwrap();
        assert_eq!(
            queue.resolve("G9", true).unwrap_err(),
            ProtocolViolation::Completed("G9".into())
        );
        assert_eq!(
            queue.entries().map(|e| e.lifecycle).collect::<Vec<_>>(),
            vec![Lifecycle::Denied, Lifecycle::Granted]
        );
    }

    #[test]
    fn serialized_queue_restores_active_entry() {
        let mut queue = queue(&["G1", "G2", "G3"]);
        queue.resolve("G1", true).unwrap();

        let json = serde_json::to_string(&queue).unwrap();
        let restored: ResolutionQueue = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.active().unwrap().entry.unit.key, "G2");
        assert_eq!(restored.active().unwrap().index, 1);
    }
}
