//! Error types for authz-core

use thiserror::Error;

/// Result type alias for authz-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in authz-core
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A namespaced subject string could not be parsed.
    #[error("Invalid subject '{subject}': {reason}")]
    InvalidSubject {
        /// The offending subject string
        subject: String,
        /// What was wrong with it
        reason: String,
    },

    /// A fact line or field list does not fit the model.
    #[error("Invalid fact: {0}")]
    InvalidFact(String),

    /// A domain repository lookup failed.
    #[error("Repository error: {0}")]
    Repository(String),

    /// Configuration is missing or malformed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Creates a new invalid-subject error.
    pub fn invalid_subject(subject: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidSubject {
            subject: subject.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new invalid-fact error.
    pub fn invalid_fact(message: impl Into<String>) -> Self {
        Error::InvalidFact(message.into())
    }

    /// Creates a new repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Error::Repository(message.into())
    }

    /// Creates a new configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(message.into())
    }
}
