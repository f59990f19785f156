//! SQLite audit log and checkpoint store.

use crate::{Error, Event, Result, SessionId};
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;

/// Summary of one recorded session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub application: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub request_count: usize,
}

/// SQLite-backed audit event store.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                session_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                application TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_session
                ON events(session_id, timestamp);
            CREATE TABLE IF NOT EXISTS checkpoints (
                session_id TEXT PRIMARY KEY,
                updated_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO events (id, session_id, timestamp, application, kind, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                event.id.to_string(),
                event.session_id.to_string(),
                format_timestamp(&event.timestamp),
                event.application,
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Load all events for a session, ordered by timestamp.
    pub fn load_session(&self, session_id: SessionId) -> Result<Vec<Event>> {
        self.load_events(session_id, None)
    }

    /// Load events for a session, optionally filtered by kind name.
    pub fn load_events(&self, session_id: SessionId, kind: Option<&str>) -> Result<Vec<Event>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, timestamp, application, data FROM events
             WHERE session_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY timestamp, rowid",
        )?;

        let rows = stmt
            .query_map(params![session_id.to_string(), kind], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, session_id, timestamp, application, data)| {
                Ok(Event {
                    id: id.parse().map_err(|_| Error::Corrupt(format!("event id {id}")))?,
                    session_id: session_id
                        .parse()
                        .map_err(|_| Error::Corrupt(format!("session id {session_id}")))?,
                    timestamp: parse_timestamp(&timestamp)?,
                    application,
                    kind: serde_json::from_str(&data)?,
                })
            })
            .collect()
    }

    /// List all sessions, most recent first.
    pub fn list_sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT session_id,
                    MIN(application),
                    MIN(timestamp),
                    MAX(CASE WHEN kind = 'session_end' THEN timestamp END),
                    SUM(CASE WHEN kind = 'requested' THEN 1 ELSE 0 END)
             FROM events
             GROUP BY session_id
             ORDER BY MIN(timestamp) DESC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, application, started, ended, requests)| {
                Ok(SessionSummary {
                    id: id
                        .parse()
                        .map_err(|_| Error::Corrupt(format!("session id {id}")))?,
                    application,
                    started_at: parse_timestamp(&started)?,
                    ended_at: ended.as_deref().map(parse_timestamp).transpose()?,
                    request_count: usize::try_from(requests).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Store the serialized state of an in-flight session, replacing any earlier one.
    pub fn save_checkpoint(&self, session_id: SessionId, data: &serde_json::Value) -> Result<()> {
        self.conn.lock().execute(
            "INSERT INTO checkpoints (session_id, updated_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET updated_at = excluded.updated_at,
                                                   data = excluded.data",
            params![
                session_id.to_string(),
                format_timestamp(&Utc::now()),
                serde_json::to_string(data)?,
            ],
        )?;
        Ok(())
    }

    /// Load the latest checkpoint of a session.
    pub fn load_checkpoint(&self, session_id: SessionId) -> Result<serde_json::Value> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT data FROM checkpoints WHERE session_id = ?1",
                [session_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        let data = data.ok_or_else(|| Error::NotFound(format!("checkpoint for {session_id}")))?;
        Ok(serde_json::from_str(&data)?)
    }
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| Error::Corrupt(format!("timestamp {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EventKind, RecordedResult};

    #[test]
    fn append_and_load_session_in_order() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();
        store
            .append(&Event::new(session, "com.example", EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::new(
                session,
                "com.example",
                EventKind::Requested {
                    capability: "CAMERA".into(),
                },
            ))
            .unwrap();

        let events = store.load_session(session).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::SessionStart);
        assert_eq!(events[1].application, "com.example");
    }

    #[test]
    fn load_events_filters_by_kind() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();
        for capability in ["CAMERA", "MIC"] {
            store
                .append(&Event::new(
                    session,
                    "app",
                    EventKind::Denied {
                        capability: capability.into(),
                    },
                ))
                .unwrap();
        }
        store
            .append(&Event::new(session, "app", EventKind::SessionEnd))
            .unwrap();

        let denied = store.load_events(session, Some("denied")).unwrap();
        assert_eq!(denied.len(), 2);
    }

    #[test]
    fn list_sessions_reports_end_and_request_count() {
        let store = EventStore::in_memory().unwrap();
        let open = SessionId::new();
        let closed = SessionId::new();

        store
            .append(&Event::new(open, "a", EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::new(closed, "b", EventKind::SessionStart))
            .unwrap();
        store
            .append(&Event::new(
                closed,
                "b",
                EventKind::Requested {
                    capability: "CAMERA".into(),
                },
            ))
            .unwrap();
        store
            .append(&Event::new(
                closed,
                "b",
                EventKind::Completed {
                    results: vec![RecordedResult {
                        capability: "CAMERA".into(),
                        granted: false,
                    }],
                },
            ))
            .unwrap();
        store
            .append(&Event::new(closed, "b", EventKind::SessionEnd))
            .unwrap();

        let sessions = store.list_sessions().unwrap();
        assert_eq!(sessions.len(), 2);
        let closed_summary = sessions.iter().find(|s| s.id == closed).unwrap();
        assert!(closed_summary.ended_at.is_some());
        assert_eq!(closed_summary.request_count, 1);
        let open_summary = sessions.iter().find(|s| s.id == open).unwrap();
        assert!(open_summary.ended_at.is_none());
    }

    #[test]
    fn checkpoint_is_replaced_on_save() {
        let store = EventStore::in_memory().unwrap();
        let session = SessionId::new();
        store
            .save_checkpoint(session, &serde_json::json!({"step": 1}))
            .unwrap();
        store
            .save_checkpoint(session, &serde_json::json!({"step": 2}))
            .unwrap();

        let loaded = store.load_checkpoint(session).unwrap();
        assert_eq!(loaded["step"], 2);
    }

    #[test]
    fn missing_checkpoint_is_not_found() {
        let store = EventStore::in_memory().unwrap();
        let err = store.load_checkpoint(SessionId::new()).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
