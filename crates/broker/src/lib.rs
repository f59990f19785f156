//! Runtime capability grant broker.
//!
//! An application asks for a list of capabilities. The broker:
//!
//! 1. **Normalizes** the request, keeping duplicates and original order.
//! 2. **Resolves** each capability to the group (or, in capability mode, the
//!    single capability) the operator decides on.
//! 3. **Expands** every grant or revoke through version-dependent split rules.
//! 4. **Evaluates** each unit against the device policy and live grant state,
//!    settling what it can without asking.
//! 5. **Queues** the rest and asks about them one at a time.
//! 6. **Aggregates** one outcome per requested slot from the grant store.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use broker::{Catalog, Context, Decision, MemoryGrantStore, Session, Step};
//! use policy::DevicePolicy;
//! use storage::EventStore;
//!
//! let catalog = Arc::new(Catalog::load("permgate.toml")?);
//! let ctx = Context::new(
//!     catalog.clone(),
//!     catalog,
//!     Arc::new(DevicePolicy::default()),
//!     Arc::new(MemoryGrantStore::new()),
//!     Arc::new(EventStore::in_memory()?),
//! );
//!
//! let mut session = Session::open(ctx, "com.example.camera", vec!["CAMERA".into()]);
//! while let Step::Prompt(prompt) = session.next() {
//!     println!("{}", prompt.message);
//!     session.decide(Decision::grant(prompt.unit))?;
//! }
//! # Ok::<(), broker::Error>(())
//! ```

mod aggregate;
mod audit;
mod catalog;
mod config;
mod driver;
mod error;
mod evaluate;
mod grants;
mod model;
mod normalize;
mod queue;
mod resolve;
mod session;
mod split;
mod traits;
mod unit;

pub use catalog::{ApplicationEntry, Catalog, CapabilityEntry, CatalogFile};
pub use config::{
    DEFAULT_LEGACY_MAX_VERSION, DEFAULT_RUNTIME_MIN_VERSION, Granularity, SessionConfig,
};
pub use driver::{CheckpointSink, Operator, drive};
pub use error::{Error, ProtocolViolation, Result};
pub use grants::MemoryGrantStore;
pub use model::{
    ApplicationId, ApplicationModel, CapabilityDescriptor, CapabilityGroup, CapabilityId,
    GroupInfo, Outcome, ProtectionClass, ResultSlot, ResultVector, SplitRule,
};
pub use queue::{Lifecycle, QueueEntry, ResolutionQueue};
pub use session::{Checkpoint, Context, Decision, Prompt, Session, Step};
pub use split::SplitExpander;
pub use traits::{AuditSink, CapabilityRegistry, GrantStore, LoadError, ModelLoader};
pub use unit::{Unit, UnitFlags};
