//! SQLite-backed persistence for permgate.
//!
//! This crate holds everything the grant broker writes to disk:
//!
//! 1. **Audit Trail**: requested capabilities, operator denials and the final
//!    result of each session, keyed by [`SessionId`].
//!
//! 2. **Checkpoints**: the serialized state of an unfinished session, so a
//!    paused process can resume with the same prompt on screen.
//!
//! 3. **Grant Table**: per-application grant flags (granted, user-set,
//!    user-fixed, policy-fixed) used as the authoritative grant store.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, GrantTable, SessionId};
//!
//! let store = EventStore::open("permgate.db")?;
//! let session_id = SessionId::new();
//! store.append(&Event::new(session_id, "com.example.camera", EventKind::SessionStart))?;
//!
//! let grants = GrantTable::open("permgate.db")?;
//! grants.set_granted("com.example.camera", &["CAMERA"], true, false)?;
//! assert!(grants.flags("com.example.camera", "CAMERA")?.granted);
//!
//! for summary in store.list_sessions()? {
//!     println!("{}: {} requested", summary.id, summary.request_count);
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod grants;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, RecordedResult, SessionId};
pub use grants::{FixedFlag, GrantFlags, GrantTable};
pub use store::{EventStore, SessionSummary};
