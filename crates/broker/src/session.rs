//! One grant session: from a raw request to a result vector.

use crate::aggregate::{Aggregator, Completion};
use crate::config::{Granularity, SessionConfig};
use crate::evaluate::Evaluator;
use crate::model::{ApplicationId, ApplicationModel, CapabilityId, ResultVector};
use crate::normalize::{NormalizedRequest, admit};
use crate::queue::{Active, ResolutionQueue};
use crate::resolve::resolve;
use crate::split::SplitExpander;
use crate::traits::{AuditSink, CapabilityRegistry, GrantStore, ModelLoader};
use crate::{Error, ProtocolViolation, Result};
use policy::DirectiveProvider;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storage::SessionId;
use tracing::{debug, info, warn};

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct Context {
    pub registry: Arc<dyn CapabilityRegistry>,
    pub loader: Arc<dyn ModelLoader>,
    pub policy: Arc<dyn DirectiveProvider>,
    pub grants: Arc<dyn GrantStore>,
    pub audit: Arc<dyn AuditSink>,
    pub config: SessionConfig,
}

impl Context {
    pub fn new(
        registry: Arc<dyn CapabilityRegistry>,
        loader: Arc<dyn ModelLoader>,
        policy: Arc<dyn DirectiveProvider>,
        grants: Arc<dyn GrantStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            loader,
            policy,
            grants,
            audit,
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

/// What the operator is asked about the active unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// Key of the unit a decision must name.
    pub unit: String,
    pub label: String,
    pub message: String,
    pub icon: Option<String>,
    /// Zero-based position of the unit in the queue.
    pub index: usize,
    pub total: usize,
    /// Offer "don't ask again"; only after the operator has decided once before.
    pub remember_affordance: bool,
}

/// The operator's answer to a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub unit: String,
    pub granted: bool,
    /// Pin the decision so the unit is never prompted again.
    #[serde(default)]
    pub remember: bool,
}

impl Decision {
    pub fn grant(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            granted: true,
            remember: false,
        }
    }

    pub fn deny(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            granted: false,
            remember: false,
        }
    }

    pub fn remembered(mut self) -> Self {
        self.remember = true;
        self
    }
}

/// What the session needs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Prompt(Prompt),
    Complete(ResultVector),
}

/// Serialized state of a session, enough to resume it in another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session: SessionId,
    pub application: ApplicationId,
    pub requested: Vec<CapabilityId>,
    pub granularity: Granularity,
    /// `None` when the request was rejected before anything was queued.
    pub queue: Option<ResolutionQueue>,
    pub result: Option<ResultVector>,
}

enum Phase {
    /// Rejected or empty: every slot is reported from the store, nothing is asked.
    Settled,
    Resolving {
        model: ApplicationModel,
        queue: ResolutionQueue,
    },
}

/// A grant session for one application.
///
/// Opening a session evaluates every requested unit against the device policy
/// and live grant state; what is left is asked one unit at a time through
/// [`Session::next`] and [`Session::decide`].
pub struct Session {
    pub id: SessionId,
    ctx: Context,
    application: ApplicationId,
    request: NormalizedRequest,
    phase: Phase,
    aggregator: Aggregator,
}

impl Session {
    /// Start a session. Never fails: an invalid request completes with every
    /// slot denied.
    pub fn open(
        ctx: Context,
        application: impl Into<ApplicationId>,
        requested: Vec<CapabilityId>,
    ) -> Self {
        let mut session = Self {
            id: SessionId::new(),
            ctx,
            application: application.into(),
            request: NormalizedRequest::new(requested),
            phase: Phase::Settled,
            aggregator: Aggregator::new(),
        };
        if session.request.is_empty() {
            debug!(session = %session.id, "empty request");
            return session;
        }

        if let Err(e) = session.ctx.audit.log_started(session.id, &session.application) {
            warn!(session = %session.id, error = %e, "failed to record session start");
        }
        match session.prepare() {
            Ok((model, queue)) => session.phase = Phase::Resolving { model, queue },
            Err(e) => {
                info!(session = %session.id, application = %session.application, error = %e, "request rejected");
            }
        }

        if let Phase::Resolving { queue, .. } = &session.phase {
            if !queue.is_empty() {
                for id in session.request.original() {
                    if let Err(e) = session.ctx.audit.log_requested(session.id, &session.application, id) {
                        warn!(session = %session.id, capability = %id, error = %e, "failed to record request");
                    }
                }
            }
        }
        session
    }

    fn prepare(&self) -> Result<(ApplicationModel, ResolutionQueue)> {
        self.request.validate()?;
        let model = self
            .ctx
            .loader
            .load(&self.application)
            .map_err(|e| Error::RequestInvalid(e.to_string()))?;
        admit(&model, &self.ctx.config)?;
        let directive = self
            .ctx
            .policy
            .directive()
            .map_err(|e| Error::RequestInvalid(format!("device policy unavailable: {e}")))?;

        let units = resolve(
            &self.request,
            &model,
            self.ctx.registry.as_ref(),
            self.ctx.config.granularity,
        );
        let evaluation = {
            let expander =
                SplitExpander::new(&model, self.ctx.registry.split_rules(), self.ctx.config);
            Evaluator {
                application: &self.application,
                grants: self.ctx.grants.as_ref(),
                expander: &expander,
                directive,
            }
            .evaluate(units)
        };
        info!(
            session = %self.id,
            application = %self.application,
            ?directive,
            settled = evaluation.resolved.len(),
            queued = evaluation.queue.len(),
            "request evaluated"
        );
        Ok((model, evaluation.queue))
    }

    pub fn application(&self) -> &ApplicationId {
        &self.application
    }

    pub fn is_complete(&self) -> bool {
        self.aggregator.is_finished()
    }

    /// The active prompt, or the result vector once nothing is left to ask.
    pub fn next(&mut self) -> Step {
        if let Some(result) = self.aggregator.result() {
            return Step::Complete(result.clone());
        }
        self.settle_granted();
        if let Phase::Resolving { model, queue } = &self.phase {
            if let Some(active) = queue.active() {
                return Step::Prompt(self.prompt(model, active));
            }
        }
        Step::Complete(self.finish())
    }

    /// Resolve active units that became granted after they were queued, such as
    /// a split replacement granted along with its root. Flags are re-read from
    /// the store; the affected set is granted again like an already-granted unit.
    fn settle_granted(&mut self) {
        let Phase::Resolving { queue, .. } = &mut self.phase else {
            return;
        };
        while let Some(active) = queue.active() {
            let unit = &active.entry.unit;
            match unit.flags(&self.application, self.ctx.grants.as_ref()) {
                Ok(flags) if flags.granted => {}
                Ok(_) => return,
                Err(e) => {
                    warn!(unit = %unit.key, error = %e, "failed to read grant flags");
                    return;
                }
            }
            let key = unit.key.clone();
            let affected: Vec<CapabilityId> = active.entry.affected.iter().cloned().collect();

            let written = self.ctx.grants.grant(&self.application, &affected, false);
            if let Err(e) = &written {
                warn!(unit = %key, error = %e, "grant write failed");
            }
            debug!(session = %self.id, unit = %key, "unit granted since queued; not prompting");
            if let Err(e) = queue.resolve(&key, written.is_ok()) {
                warn!(unit = %key, error = %e, "failed to settle granted unit");
                return;
            }
        }
    }

    /// Apply the operator's decision to the active unit.
    ///
    /// A decision that does not name the active unit is rejected and nothing
    /// changes.
    pub fn decide(&mut self, decision: Decision) -> Result<Step> {
        if self.aggregator.is_finished() {
            return Err(ProtocolViolation::Completed(decision.unit).into());
        }
        let Phase::Resolving { queue, .. } = &mut self.phase else {
            return Err(ProtocolViolation::Completed(decision.unit).into());
        };
        let affected: Vec<CapabilityId> = queue.check(&decision.unit)?.affected.iter().cloned().collect();

        let committed = commit(&self.ctx, &self.application, &affected, &decision);
        queue.resolve(&decision.unit, decision.granted && committed)?;
        info!(
            session = %self.id,
            unit = %decision.unit,
            granted = decision.granted,
            remember = decision.remember,
            "operator decision"
        );

        if !decision.granted {
            for id in &affected {
                if let Err(e) = self.ctx.audit.log_denied(self.id, &self.application, id) {
                    warn!(session = %self.id, capability = %id, error = %e, "failed to record denial");
                }
            }
        }
        Ok(self.next())
    }

    /// Stop asking. Units not yet decided keep their stored state.
    pub fn abandon(&mut self) -> ResultVector {
        if !self.aggregator.is_finished() {
            info!(session = %self.id, "session abandoned");
        }
        self.finish()
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            session: self.id,
            application: self.application.clone(),
            requested: self.request.original().to_vec(),
            granularity: self.ctx.config.granularity,
            queue: match &self.phase {
                Phase::Settled => None,
                Phase::Resolving { queue, .. } => Some(queue.clone()),
            },
            result: self.aggregator.result().cloned(),
        }
    }

    /// Resume a session from a checkpoint. The application model is reloaded;
    /// nothing is re-evaluated and no start records are written.
    pub fn restore(mut ctx: Context, checkpoint: Checkpoint) -> Result<Self> {
        ctx.config.granularity = checkpoint.granularity;
        let phase = match checkpoint.queue {
            None => Phase::Settled,
            Some(queue) => {
                let model = ctx.loader.load(&checkpoint.application).map_err(|e| {
                    Error::Checkpoint(format!("session {}: {e}", checkpoint.session))
                })?;
                Phase::Resolving { model, queue }
            }
        };
        debug!(session = %checkpoint.session, "session restored");
        Ok(Self {
            id: checkpoint.session,
            ctx,
            application: checkpoint.application,
            request: NormalizedRequest::new(checkpoint.requested),
            phase,
            aggregator: Aggregator::restored(checkpoint.result),
        })
    }

    fn finish(&mut self) -> ResultVector {
        let (model, queued) = match &self.phase {
            Phase::Settled => (None, Vec::new()),
            Phase::Resolving { model, queue } => (Some(model), queue.keys()),
        };
        self.aggregator.finalize(Completion {
            session: self.id,
            application: &self.application,
            request: &self.request,
            model,
            queued,
            registry: self.ctx.registry.as_ref(),
            grants: self.ctx.grants.as_ref(),
            audit: self.ctx.audit.as_ref(),
        })
    }

    fn prompt(&self, model: &ApplicationModel, active: Active<'_>) -> Prompt {
        let unit = &active.entry.unit;
        let group = model.group(&unit.group);

        let (label, description) = match self.ctx.config.granularity {
            Granularity::Group => match group {
                Some(group) => (
                    non_empty(&group.info.label).unwrap_or_else(|| unit.key.clone()),
                    non_empty(&group.info.description)
                        .unwrap_or_else(|| format!("access {}", unit.key)),
                ),
                None => (unit.key.clone(), format!("access {}", unit.key)),
            },
            Granularity::Capability => {
                let label = unit
                    .scope
                    .first()
                    .and_then(|id| self.ctx.registry.descriptor(id))
                    .and_then(|descriptor| descriptor.label)
                    .unwrap_or_else(|| format!("access {}", unit.key));
                (label.clone(), label)
            }
        };

        let remember_affordance = match unit.flags(&self.application, self.ctx.grants.as_ref()) {
            Ok(flags) => flags.user_set,
            Err(e) => {
                warn!(unit = %unit.key, error = %e, "failed to read grant flags");
                false
            }
        };

        Prompt {
            unit: unit.key.clone(),
            label,
            message: format!("Allow {} to {description}?", model.label),
            icon: group.and_then(|group| group.info.icon.clone()),
            index: active.index,
            total: active.total,
            remember_affordance,
        }
    }
}

fn non_empty(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

/// Write a decision to the grant store. `false` if the grant write failed.
fn commit(
    ctx: &Context,
    application: &ApplicationId,
    affected: &[CapabilityId],
    decision: &Decision,
) -> bool {
    let written = if decision.granted {
        ctx.grants.grant(application, affected, false)
    } else {
        ctx.grants.revoke(application, affected, false)
    };
    if let Err(e) = written {
        warn!(unit = %decision.unit, error = %e, "grant write failed");
        return false;
    }
    if decision.remember {
        for id in affected {
            if let Err(e) = ctx.grants.set_user_fixed(application, id) {
                warn!(capability = %id, error = %e, "failed to pin user decision");
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::grants::MemoryGrantStore;
    use crate::model::Outcome;
    use policy::{DevicePolicy, PolicyDirective};
    use storage::EventStore;

    const CATALOG: &str = r#"
[[group]]
name = "CAMERA"
label = "Camera"
description = "take pictures and record video"
icon = "camera"

[[group]]
name = "MICROPHONE"
label = "Microphone"
description = "record audio"

[[capability]]
id = "CAM"
group = "CAMERA"
protection = "dangerous"
label = "take pictures"

[[capability]]
id = "MIC"
group = "MICROPHONE"
protection = "dangerous"

[[application]]
id = "app"
label = "Snap"
model_version = 30
declares = ["CAM", "MIC"]
"#;

    fn context(grants: Arc<MemoryGrantStore>) -> Context {
        let catalog = Arc::new(Catalog::parse(CATALOG).unwrap());
        Context::new(
            catalog.clone(),
            catalog,
            Arc::new(DevicePolicy::new(PolicyDirective::None)),
            grants,
            Arc::new(EventStore::in_memory().unwrap()),
        )
    }

    fn ids(raw: &[&str]) -> Vec<CapabilityId> {
        raw.iter().map(|id| CapabilityId::from(*id)).collect()
    }

    fn prompt(step: Step) -> Prompt {
        match step {
            Step::Prompt(prompt) => prompt,
            Step::Complete(result) => panic!("expected a prompt, got {result:?}"),
        }
    }

    #[test]
    fn prompt_describes_group() {
        let mut session = Session::open(context(Arc::default()), "app", ids(&["CAM", "MIC"]));
        let prompt = prompt(session.next());

        assert_eq!(prompt.unit, "CAMERA");
        assert_eq!(prompt.label, "Camera");
        assert_eq!(prompt.message, "Allow Snap to take pictures and record video?");
        assert_eq!(prompt.icon.as_deref(), Some("camera"));
        assert_eq!((prompt.index, prompt.total), (0, 2));
        assert!(!prompt.remember_affordance);
    }

    #[test]
    fn capability_prompt_uses_descriptor_label() {
        let ctx = context(Arc::default())
            .with_config(SessionConfig::default().with_granularity(Granularity::Capability));
        let mut session = Session::open(ctx, "app", ids(&["MIC", "CAM"]));

        let first = prompt(session.next());
        assert_eq!(first.unit, "MIC");
        assert_eq!(first.label, "access MIC");
        let second = prompt(session.decide(Decision::grant("MIC")).unwrap());
        assert_eq!(second.label, "take pictures");
        assert_eq!(second.message, "Allow Snap to take pictures?");
    }

    #[test]
    fn remember_affordance_follows_user_set() {
        let grants = Arc::new(MemoryGrantStore::new().with_flags(
            "app",
            "MIC",
            storage::GrantFlags {
                user_set: true,
                ..Default::default()
            },
        ));
        let mut session = Session::open(context(grants), "app", ids(&["MIC"]));
        assert!(prompt(session.next()).remember_affordance);
    }

    #[test]
    fn decision_for_inactive_unit_changes_nothing() {
        let grants = Arc::new(MemoryGrantStore::new());
        let mut session = Session::open(context(grants.clone()), "app", ids(&["CAM", "MIC"]));

        let err = session.decide(Decision::grant("MICROPHONE")).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::NotActive { .. })));
        assert!(!grants.snapshot(&"app".into(), &"MIC".into()).granted);
        assert_eq!(prompt(session.next()).unit, "CAMERA");
    }

    #[test]
    fn abandon_reports_stored_state_and_rejects_late_decisions() {
        let grants = Arc::new(MemoryGrantStore::new());
        let mut session = Session::open(context(grants), "app", ids(&["CAM", "MIC"]));
        session.decide(Decision::grant("CAMERA")).unwrap();

        let result = session.abandon();
        assert_eq!(result.outcomes(), vec![Outcome::Granted, Outcome::Denied]);
        assert!(session.is_complete());
        let err = session.decide(Decision::grant("MICROPHONE")).unwrap_err();
        assert!(matches!(err, Error::Protocol(ProtocolViolation::Completed(_))));
        assert_eq!(session.next(), Step::Complete(result));
    }

    #[test]
    fn invalid_request_completes_denied_without_prompt() {
        let mut session = Session::open(context(Arc::default()), "app", ids(&["CAM", " "]));
        assert_eq!(
            session.next(),
            Step::Complete(ResultVector::denied(&ids(&["CAM", " "])))
        );
        assert!(session.checkpoint().queue.is_none());
    }
}
