//! Policy error types.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The directive provider could not answer.
    #[error("policy provider unavailable: {0}")]
    Unavailable(String),

    /// The policy file is not valid TOML or names an unknown directive.
    #[error("failed to parse policy: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
