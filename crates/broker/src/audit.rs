//! Audit trail backed by the event store.

use crate::model::{ApplicationId, CapabilityId, ResultVector};
use crate::traits::AuditSink;
use crate::Result;
use storage::{Event, EventKind, EventStore, SessionId};

impl AuditSink for EventStore {
    fn log_started(&self, session: SessionId, application: &ApplicationId) -> Result<()> {
        self.append(&Event::new(session, application.as_str(), EventKind::SessionStart))?;
        Ok(())
    }

    fn log_requested(&self, session: SessionId, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        let kind = EventKind::Requested {
            capability: id.to_string(),
        };
        self.append(&Event::new(session, application.as_str(), kind))?;
        Ok(())
    }

    fn log_denied(&self, session: SessionId, application: &ApplicationId, id: &CapabilityId) -> Result<()> {
        let kind = EventKind::Denied {
            capability: id.to_string(),
        };
        self.append(&Event::new(session, application.as_str(), kind))?;
        Ok(())
    }

    fn log_groups_requested(&self, session: SessionId, application: &ApplicationId, groups: &[String]) -> Result<()> {
        let kind = EventKind::GroupsRequested {
            groups: groups.to_vec(),
        };
        self.append(&Event::new(session, application.as_str(), kind))?;
        Ok(())
    }

    fn log_completed(&self, session: SessionId, application: &ApplicationId, results: &ResultVector) -> Result<()> {
        let kind = EventKind::Completed {
            results: results.into(),
        };
        self.append(&Event::new(session, application.as_str(), kind))?;
        self.append(&Event::new(session, application.as_str(), EventKind::SessionEnd))?;
        Ok(())
    }
}
