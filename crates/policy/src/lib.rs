//! Administrator policy for runtime capability grants.
//!
//! Core principle: **a device policy directive, when set, decides instead of the operator.**
//!
//! The directive is read once when a grant session starts. Units that are already
//! fixed (by the user or by an earlier policy) are never re-evaluated against it.

mod directive;
mod error;
mod policy;

pub use directive::{DevicePolicy, DirectiveProvider, PolicyDirective};
pub use error::{Error, Result};
pub use policy::{UnitStatus, Verdict, evaluate};
