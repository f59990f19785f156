//! Persistent per-application grant flags.

use crate::Result;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Grant flags of one capability for one application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantFlags {
    pub granted: bool,
    pub user_set: bool,
    pub user_fixed: bool,
    pub policy_fixed: bool,
}

/// A flag that can be pinned on a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixedFlag {
    User,
    Policy,
}

/// SQLite-backed grant table.
pub struct GrantTable {
    conn: Mutex<Connection>,
}

impl GrantTable {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS grants (
                application TEXT NOT NULL,
                capability TEXT NOT NULL,
                granted INTEGER NOT NULL DEFAULT 0,
                user_set INTEGER NOT NULL DEFAULT 0,
                user_fixed INTEGER NOT NULL DEFAULT 0,
                policy_fixed INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (application, capability)
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Current flags; a capability with no row has every flag cleared.
    pub fn flags(&self, application: &str, capability: &str) -> Result<GrantFlags> {
        let flags = self
            .conn
            .lock()
            .query_row(
                "SELECT granted, user_set, user_fixed, policy_fixed FROM grants
                 WHERE application = ?1 AND capability = ?2",
                params![application, capability],
                |row| {
                    Ok(GrantFlags {
                        granted: row.get(0)?,
                        user_set: row.get(1)?,
                        user_fixed: row.get(2)?,
                        policy_fixed: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(flags.unwrap_or_default())
    }

    /// Set the granted flag of every listed capability in one transaction.
    ///
    /// A write on behalf of policy pins `policy_fixed`; any other write marks the
    /// capability as user-set.
    pub fn set_granted<S: AsRef<str>>(
        &self,
        application: &str,
        capabilities: &[S],
        granted: bool,
        by_policy: bool,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for capability in capabilities {
            tx.execute(
                "INSERT INTO grants (application, capability, granted, user_set, policy_fixed)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(application, capability) DO UPDATE SET
                    granted = excluded.granted,
                    user_set = user_set OR excluded.user_set,
                    policy_fixed = policy_fixed OR excluded.policy_fixed",
                params![application, capability.as_ref(), granted, !by_policy, by_policy],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Pin a capability so it is never prompted for again.
    pub fn mark_fixed(&self, application: &str, capability: &str, flag: FixedFlag) -> Result<()> {
        let sql = match flag {
            FixedFlag::User => {
                "INSERT INTO grants (application, capability, user_fixed) VALUES (?1, ?2, 1)
                 ON CONFLICT(application, capability) DO UPDATE SET user_fixed = 1"
            }
            FixedFlag::Policy => {
                "INSERT INTO grants (application, capability, policy_fixed) VALUES (?1, ?2, 1)
                 ON CONFLICT(application, capability) DO UPDATE SET policy_fixed = 1"
            }
        };
        self.conn.lock().execute(sql, params![application, capability])?;
        Ok(())
    }

    /// All recorded capabilities of an application, by name.
    pub fn list(&self, application: &str) -> Result<Vec<(String, GrantFlags)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT capability, granted, user_set, user_fixed, policy_fixed FROM grants
             WHERE application = ?1 ORDER BY capability",
        )?;
        let rows = stmt
            .query_map([application], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    GrantFlags {
                        granted: row.get(1)?,
                        user_set: row.get(2)?,
                        user_fixed: row.get(3)?,
                        policy_fixed: row.get(4)?,
                    },
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_capability_has_no_flags() {
        let table = GrantTable::in_memory().unwrap();
        assert_eq!(table.flags("app", "CAMERA").unwrap(), GrantFlags::default());
    }

    #[test]
    fn user_grant_marks_user_set() {
        let table = GrantTable::in_memory().unwrap();
        table
            .set_granted("app", &["CAMERA", "CAMERA_AUDIO"], true, false)
            .unwrap();

        let flags = table.flags("app", "CAMERA_AUDIO").unwrap();
        assert!(flags.granted);
        assert!(flags.user_set);
        assert!(!flags.policy_fixed);
        assert!(!table.flags("other", "CAMERA").unwrap().granted);
    }

    #[test]
    fn policy_revoke_keeps_earlier_user_set() {
        let table = GrantTable::in_memory().unwrap();
        table.set_granted("app", &["MIC"], true, false).unwrap();
        table.set_granted("app", &["MIC"], false, true).unwrap();

        let flags = table.flags("app", "MIC").unwrap();
        assert!(!flags.granted);
        assert!(flags.user_set);
        assert!(flags.policy_fixed);
    }

    #[test]
    fn mark_fixed_creates_or_updates_row() {
        let table = GrantTable::in_memory().unwrap();
        table.mark_fixed("app", "MIC", FixedFlag::User).unwrap();
        table.set_granted("app", &["CAMERA"], true, false).unwrap();
        table.mark_fixed("app", "CAMERA", FixedFlag::Policy).unwrap();

        let listed = table.list("app").unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0, "CAMERA");
        assert!(listed[0].1.granted && listed[0].1.policy_fixed);
        assert!(listed[1].1.user_fixed && !listed[1].1.granted);
    }
}
