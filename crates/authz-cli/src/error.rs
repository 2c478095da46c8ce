//! Error types for authz-cli

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for authz-cli operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in authz-cli
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Error from authz-core
    #[error("Core error: {0}")]
    Core(#[from] authz_core::Error),

    /// Error from authz-storage
    #[error("Storage error: {0}")]
    Storage(#[from] authz_storage::Error),

    /// Error from authz-acl
    #[error("Policy error: {0}")]
    Acl(#[from] authz_acl::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse {path}: {source}")]
    Toml {
        /// File being parsed.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: toml::de::Error,
    },

    /// Filesystem error on a named path
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failure writing output or waiting for a signal
    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    /// A background service did not come up
    #[error("Service error: {0}")]
    Service(String),

    /// Command-line argument that could not be interpreted
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io_with_path(source: std::io::Error, path: impl AsRef<Path>) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
