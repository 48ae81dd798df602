//! Git access layer error types

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum GitError {
    #[error("git spawn failed: {message}")]
    SpawnFailed { message: String },

    #[error("git clone failed for {url}: {message}")]
    CloneFailed { url: String, message: String },

    #[error("no checkout produced under {path}")]
    EmptyCheckout { path: String },

    #[error("ssh key enumeration failed: {message}")]
    KeyScanFailed { message: String },
}
