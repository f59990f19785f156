//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The database file does not exist.
    ///
    /// This typically means no request has been made yet.
    #[error("database not found at {path}. Run 'permgate request' first")]
    DatabaseNotFound { path: PathBuf },

    /// No session was found matching the given prefix.
    #[error("no session found matching '{prefix}'")]
    SessionNotFound { prefix: String },

    /// Multiple sessions match the given prefix.
    ///
    /// The user should provide a longer prefix to disambiguate.
    #[error("multiple sessions match '{prefix}': {matches:?}")]
    AmbiguousSession {
        prefix: String,
        matches: Vec<String>,
    },

    /// The application is not in the catalog.
    #[error("unknown application '{0}'")]
    UnknownApplication(String),

    /// Configuration is invalid or missing required fields.
    #[error("config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// An error occurred in the broker.
    #[error(transparent)]
    Broker(#[from] broker::Error),

    /// An error occurred in the storage layer.
    #[error(transparent)]
    Storage(#[from] storage::Error),

    /// A checkpoint could not be decoded.
    #[error("corrupt checkpoint: {0}")]
    Checkpoint(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
