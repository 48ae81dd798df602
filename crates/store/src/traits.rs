//! Async trait boundaries consumed by the build pipeline

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fwforge_errors::Error;
use fwforge_types::{Device, OwnerRecord};

/// Device document store.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Fetch one device by udid.
    async fn get(&self, udid: &str) -> Result<Device, Error>;

    /// All devices belonging to an owner.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Device>, Error>;

    /// Atomically stamp the device's current-build pointer. Single
    /// document update; last writer wins across concurrent builds.
    async fn set_current_build(&self, udid: &str, build_id: &str) -> Result<(), Error>;
}

/// Typed field update for a stored source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceField {
    IsPrivate(bool),
    LastBuild(String),
}

/// Owner document store (sources, transmit key).
#[async_trait]
pub trait OwnerStore: Send + Sync {
    async fn get(&self, owner: &str) -> Result<OwnerRecord, Error>;

    /// Update one field of one stored source.
    async fn update_source(
        &self,
        owner: &str,
        source_id: &str,
        field: SourceField,
    ) -> Result<(), Error>;
}

/// Provider of the owner's most recent API key.
#[async_trait]
pub trait ApiKeyProvider: Send + Sync {
    async fn last_api_key(&self, owner: &str) -> Result<Option<String>, Error>;
}

/// Owner-scoped environment variables injected into builds.
#[async_trait]
pub trait EnvProvider: Send + Sync {
    async fn list(&self, owner: &str) -> Result<Vec<(String, String)>, Error>;
}

/// One durable build log record.
#[derive(Debug, Clone)]
pub struct BuildLogEntry {
    pub build_id: String,
    pub owner: String,
    pub udid: String,
    pub state: String,
    pub timestamp: DateTime<Utc>,
}

/// Durable build log, keyed by `(build_id, owner, udid)`.
///
/// `log` appends the initial record; `state` modifies it as the build
/// progresses. Only terminal and error states are persisted, not every
/// intermediate line.
#[async_trait]
pub trait BuildLogStore: Send + Sync {
    async fn log(
        &self,
        build_id: &str,
        owner: &str,
        udid: &str,
        state: &str,
    ) -> Result<(), Error>;

    async fn state(
        &self,
        build_id: &str,
        owner: &str,
        udid: &str,
        state: &str,
    ) -> Result<(), Error>;

    async fn get(&self, build_id: &str) -> Result<Option<BuildLogEntry>, Error>;
}

/// Fire-and-forget metrics counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsEvent {
    BuildStarted,
    BuildFailed,
}

impl fmt::Display for StatsEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BuildStarted => write!(f, "BUILD_STARTED"),
            Self::BuildFailed => write!(f, "BUILD_FAILED"),
        }
    }
}

/// Metrics sink; failures are the sink's problem, never the caller's.
pub trait StatsSink: Send + Sync {
    fn stats_log(&self, owner: &str, event: StatsEvent, build_id: &str);
}

/// Infers the target platform from a fetched source tree.
#[async_trait]
pub trait PlatformDetector: Send + Sync {
    /// Returns the platform name, or an error when the tree matches no
    /// known platform.
    async fn detect(&self, path: &Path) -> Result<String, Error>;
}
