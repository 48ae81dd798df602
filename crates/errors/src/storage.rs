//! Collaborator store error types
//!
//! The device/owner/key stores live outside this system; these variants
//! describe failures at that boundary.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("device not found: {udid}")]
    DeviceNotFound { udid: String },

    #[error("owner not found: {owner}")]
    OwnerNotFound { owner: String },

    #[error("source not found: {source_id}")]
    SourceNotFound { source_id: String },

    #[error("build log entry not found: {build_id}")]
    BuildLogNotFound { build_id: String },

    #[error("store update failed: {message}")]
    UpdateFailed { message: String },
}
