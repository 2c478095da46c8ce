//! Error types for authz-storage

use thiserror::Error;

/// Result type alias for authz-storage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in authz-storage
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from authz-core
    #[error("Core error: {0}")]
    Core(#[from] authz_core::Error),

    /// Connection, query or transaction failure
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Table name is not a plain SQL identifier
    #[error("Invalid table name '{name}'")]
    InvalidTableName {
        /// The rejected name
        name: String,
    },

    /// A partial-key removal addressed fields past the last column
    #[error("Field range {start}..{end} exceeds the {max} stored fields")]
    InvalidFieldRange {
        /// First addressed field
        start: usize,
        /// One past the last addressed field
        end: usize,
        /// Number of stored fields
        max: usize,
    },

    /// A store operation did not finish in time
    #[error("Storage operation '{operation}' timed out after {seconds}s")]
    Timeout {
        /// Operation name
        operation: &'static str,
        /// Bound in seconds
        seconds: u64,
    },
}

impl Error {
    /// Returns whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Database(e) => matches!(
                e,
                sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::Protocol(_)
            ),
            Error::Timeout { .. } => true,
            Error::Core(_) => false,
            Error::InvalidTableName { .. } => false,
            Error::InvalidFieldRange { .. } => false,
        }
    }

    /// Creates an invalid-table-name error.
    pub fn invalid_table_name(name: impl Into<String>) -> Self {
        Error::InvalidTableName { name: name.into() }
    }
}
