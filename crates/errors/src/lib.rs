#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Error types for the fwforge build orchestration engine
//!
//! This crate provides fine-grained error types organized by domain,
//! aggregated into a single [`Error`] for cross-crate boundaries. Build
//! failure variants render as the stable reason strings the API layer
//! returns to clients, so `to_string()` on a [`BuildError`] is the
//! user-visible failure reason.

use thiserror::Error;

pub mod build;
pub mod config;
pub mod git;
pub mod secrets;
pub mod storage;

// Re-export all error types at the root
pub use build::BuildError;
pub use config::ConfigError;
pub use git::GitError;
pub use secrets::SecretsError;
pub use storage::StorageError;

/// Generic error type for cross-crate boundaries
#[derive(Debug, Error)]
pub enum Error {
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("secrets error: {0}")]
    Secrets(#[from] SecretsError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
        path: Option<std::path::PathBuf>,
    },
}

impl Error {
    /// Create an internal error with a message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an Io error with an associated path
    pub fn io_with_path(err: &std::io::Error, path: impl Into<std::path::PathBuf>) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: Some(path.into()),
        }
    }

    /// The stable reason string for this error, as reported to callers.
    ///
    /// Build failures carry their own reason strings; everything else is
    /// rendered through `Display`.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Build(e) => e.to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            kind: err.kind(),
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {err}"))
    }
}
