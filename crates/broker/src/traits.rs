//! Collaborator seams of the grant broker.
//!
//! Everything the orchestrator reads or writes outside its own session state
//! goes through one of these traits.

use crate::model::{
    ApplicationId, ApplicationModel, CapabilityDescriptor, CapabilityId, ResultVector, SplitRule,
};
use crate::Result;
use storage::{GrantFlags, SessionId};
use thiserror::Error;

/// Lookup of capability descriptors and split rules.
pub trait CapabilityRegistry: Send + Sync {
    /// Descriptor of a capability, or `None` if the registry does not know it.
    fn descriptor(&self, id: &CapabilityId) -> Option<CapabilityDescriptor>;

    /// Every split rule, in registry order.
    fn split_rules(&self) -> Vec<SplitRule>;
}

/// Failure to load an application model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("application not found: {0}")]
    NotFound(ApplicationId),

    #[error("malformed application model: {0}")]
    Malformed(String),
}

/// Builds the per-session application snapshot.
pub trait ModelLoader: Send + Sync {
    fn load(&self, application: &ApplicationId) -> std::result::Result<ApplicationModel, LoadError>;
}

/// Authoritative grant state of every application.
///
/// Shared with other actors: callers re-read flags instead of caching them.
pub trait GrantStore: Send + Sync {
    fn flags(&self, application: &ApplicationId, id: &CapabilityId) -> Result<GrantFlags>;

    fn is_granted(&self, application: &ApplicationId, id: &CapabilityId) -> Result<bool> {
        Ok(self.flags(application, id)?.granted)
    }

    /// Grant every listed capability in one write.
    fn grant(&self, application: &ApplicationId, ids: &[CapabilityId], fixed_by_policy: bool)
    -> Result<()>;

    /// Revoke every listed capability in one write.
    fn revoke(
        &self,
        application: &ApplicationId,
        ids: &[CapabilityId],
        fixed_by_policy: bool,
    ) -> Result<()>;

    fn set_user_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()>;

    fn set_policy_fixed(&self, application: &ApplicationId, id: &CapabilityId) -> Result<()>;
}

/// Audit trail of a grant session.
pub trait AuditSink: Send + Sync {
    fn log_started(&self, _session: SessionId, _application: &ApplicationId) -> Result<()> {
        Ok(())
    }

    fn log_requested(
        &self,
        session: SessionId,
        application: &ApplicationId,
        id: &CapabilityId,
    ) -> Result<()>;

    fn log_denied(
        &self,
        session: SessionId,
        application: &ApplicationId,
        id: &CapabilityId,
    ) -> Result<()>;

    fn log_groups_requested(
        &self,
        session: SessionId,
        application: &ApplicationId,
        groups: &[String],
    ) -> Result<()>;

    /// The single completion record of a session.
    fn log_completed(
        &self,
        session: SessionId,
        application: &ApplicationId,
        results: &ResultVector,
    ) -> Result<()>;
}
