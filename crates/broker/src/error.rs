use thiserror::Error;

/// A decision that arrived out of order.
///
/// Rejected without touching committed state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("decision for '{received}' but the active unit is '{active}'")]
    NotActive { active: String, received: String },

    #[error("decision for '{0}' after the session completed")]
    Completed(String),

    #[error("unit '{0}' is already resolved")]
    AlreadyResolved(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    RequestInvalid(String),

    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("grant store error: {0}")]
    GrantStore(String),

    #[error("invalid catalog: {0}")]
    Catalog(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Policy(#[from] policy::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
