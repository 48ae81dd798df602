//! Build pipeline error types
//!
//! Variant messages double as the reason strings returned to the caller
//! of the build API, which is why most of them are lowercase snake-case
//! identifiers rather than prose.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum BuildError {
    #[error("missing_device_udid")]
    MissingDeviceUdid,

    #[error("missing_source_id")]
    MissingSourceId,

    #[error("missing_owner")]
    MissingOwner,

    #[error("owner undefined")]
    OwnerUndefined,

    #[error("git undefined")]
    GitUndefined,

    #[error("branch undefined")]
    BranchUndefined,

    #[error("device_not_found")]
    DeviceNotFound,

    #[error("no_such_owner")]
    NoSuchOwner,

    #[error("no_such_udid")]
    NoSuchUdid,

    #[error("invalid_params")]
    InvalidParams,

    #[error("invalid_build_id")]
    InvalidBuildId,

    #[error("workers_not_ready")]
    WorkersNotReady,

    #[error("device_mod_failed")]
    DeviceModFailed,

    #[error("build_requires_api_key")]
    RequiresApiKey,

    #[error("git_fetch_failed")]
    GitFetchFailed,

    #[error("git_fetch_failed_private")]
    GitFetchFailedPrivate,

    #[error("ambiguous_checkout: {count} directories extracted")]
    AmbiguousCheckout { count: usize },

    #[error("unknown platform: {platform}")]
    UnknownPlatform { platform: String },

    #[error("MCU defined by build policy ({declared}) not compatible with this device MCU: {device}")]
    McuIncompatible { declared: String, device: String },

    #[error("error_configuring_build")]
    ConfiguringBuild,

    #[error("builder not found for platform in: {path}")]
    MissingPlatformDescriptor { path: String },

    #[error("error_starting_build")]
    StartingBuild,
}
