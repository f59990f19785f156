//! Result aggregation and the completion audit.

use crate::model::{ApplicationId, ApplicationModel, Outcome, ResultSlot, ResultVector};
use crate::normalize::NormalizedRequest;
use crate::traits::{AuditSink, CapabilityRegistry, GrantStore};
use storage::SessionId;
use tracing::{info, warn};

/// What a finished session reports, and to whom.
pub struct Completion<'a> {
    pub session: SessionId,
    pub application: &'a ApplicationId,
    pub request: &'a NormalizedRequest,
    /// `None` when the request was rejected before a model was loaded.
    pub model: Option<&'a ApplicationModel>,
    /// Keys of the units that were shown to the operator.
    pub queued: Vec<String>,
    pub registry: &'a dyn CapabilityRegistry,
    pub grants: &'a dyn GrantStore,
    pub audit: &'a dyn AuditSink,
}

/// Builds the result vector once and replays it afterwards.
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    result: Option<ResultVector>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume with a result computed before a checkpoint.
    pub fn restored(result: Option<ResultVector>) -> Self {
        Self { result }
    }

    pub fn result(&self) -> Option<&ResultVector> {
        self.result.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    /// Compute the result vector and emit the completion audit.
    ///
    /// Only the first call reads the store or writes audit records; later
    /// calls return the same vector. An empty request completes silently.
    pub fn finalize(&mut self, completion: Completion<'_>) -> ResultVector {
        if let Some(result) = &self.result {
            return result.clone();
        }

        let result = collect(&completion);
        if !completion.request.is_empty() {
            emit(&completion, &result);
        }
        info!(
            session = %completion.session,
            application = %completion.application,
            granted = result.outcomes().iter().filter(|o| o.is_granted()).count(),
            total = result.len(),
            "session complete"
        );
        self.result = Some(result.clone());
        result
    }
}

/// One slot per requested position; duplicates share an outcome.
fn collect(completion: &Completion<'_>) -> ResultVector {
    let request = completion.request;
    let mut outcomes = vec![Outcome::Denied; request.len()];

    if let Some(model) = completion.model {
        for (id, positions) in request.positions() {
            if !model.declares(id) || completion.registry.descriptor(id).is_none() {
                continue;
            }
            let outcome = match completion.grants.is_granted(completion.application, id) {
                Ok(granted) => Outcome::from_granted(granted),
                Err(e) => {
                    warn!(capability = %id, error = %e, "failed to read grant state; reporting denied");
                    Outcome::Denied
                }
            };
            for &position in positions {
                outcomes[position] = outcome;
            }
        }
    }

    ResultVector::new(
        request
            .original()
            .iter()
            .zip(outcomes)
            .map(|(capability, outcome)| ResultSlot {
                capability: capability.clone(),
                outcome,
            })
            .collect(),
    )
}

fn emit(completion: &Completion<'_>, result: &ResultVector) {
    let audit = completion.audit;
    if !completion.queued.is_empty() {
        if let Err(e) =
            audit.log_groups_requested(completion.session, completion.application, &completion.queued)
        {
            warn!(session = %completion.session, error = %e, "failed to record requested groups");
        }
    }
    if let Err(e) = audit.log_completed(completion.session, completion.application, result) {
        warn!(session = %completion.session, error = %e, "failed to record completion");
    }
}
