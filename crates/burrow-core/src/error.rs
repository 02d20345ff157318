//! Error taxonomy for the burrow crates.
//!
//! Five externally meaningful classes plus `Internal` for store corruption
//! and serialization failures. Request handlers map these onto HTTP status
//! codes; background loops log and move on to the next tenant.

use thiserror::Error;

/// Result type alias used across the burrow crates.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that cross crate boundaries in burrow.
#[derive(Debug, Error)]
pub enum Error {
    /// Record or resource absent. Silent for delete-like operations.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conditional create collided with an existing record.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Backing store or orchestration platform unreachable.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// A budgeted wait elapsed without the condition holding.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Malformed caller input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Corrupt stored state or a serialization failure.
    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is the expected outcome of a lost create race.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Whether this error means the target was simply absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_helpers() {
        assert!(Error::AlreadyExists("t".into()).is_already_exists());
        assert!(Error::NotFound("t".into()).is_not_found());
        assert!(!Error::Unavailable("t".into()).is_not_found());
    }

    #[test]
    fn display_carries_context() {
        let err = Error::Timeout("pod burrow-agent-alice not ready after 210s".into());
        assert!(err.to_string().contains("burrow-agent-alice"));
    }
}
