//! Error types for authz-acl

use thiserror::Error;

/// Result type alias for authz-acl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in authz-acl
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from authz-core
    #[error("Core error: {0}")]
    Core(#[from] authz_core::Error),

    /// Error from the fact store
    #[error("Storage error: {0}")]
    Storage(#[from] authz_storage::Error),

    /// The engine refused an operation
    #[error("Policy error: {message}")]
    Policy {
        /// What was refused and why
        message: String,
    },

    /// A refresh cycle did not finish in time
    #[error("Policy refresh timed out after {seconds}s")]
    RefreshTimeout {
        /// Per-cycle bound in seconds
        seconds: u64,
    },
}

impl Error {
    /// Creates a policy error.
    pub fn policy<S: Into<String>>(message: S) -> Self {
        Error::Policy {
            message: message.into(),
        }
    }

    /// Returns whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_retryable(),
            Error::RefreshTimeout { .. } => true,
            Error::Core(_) => false,
            Error::Policy { .. } => false,
        }
    }
}

impl From<casbin::Error> for Error {
    fn from(err: casbin::Error) -> Self {
        match authz_storage::storage_error(err) {
            Ok(e) => Error::Storage(e),
            Err(other) => Error::policy(other.to_string()),
        }
    }
}
