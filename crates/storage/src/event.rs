//! Audit event types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a grant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Final outcome recorded for one requested capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResult {
    pub capability: String,
    pub granted: bool,
}

/// The kind of audit event that occurred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// Session started.
    SessionStart,
    /// The application asked for a capability.
    Requested { capability: String },
    /// The operator denied a capability.
    Denied { capability: String },
    /// Units that were queued for the operator during the session.
    GroupsRequested { groups: Vec<String> },
    /// The result vector handed back to the caller.
    Completed { results: Vec<RecordedResult> },
    /// Session ended.
    SessionEnd,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::SessionStart => "session_start",
            EventKind::Requested { .. } => "requested",
            EventKind::Denied { .. } => "denied",
            EventKind::GroupsRequested { .. } => "groups_requested",
            EventKind::Completed { .. } => "completed",
            EventKind::SessionEnd => "session_end",
        }
    }
}

/// An event in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub application: String,
    pub kind: EventKind,
}

impl Event {
    pub fn new(session_id: SessionId, application: impl Into<String>, kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            application: application.into(),
            kind,
        }
    }
}
