//! In-memory collaborator implementations
//!
//! Dashmap-backed stores with the same observable semantics as the real
//! document stores: single-document read-modify-write, last writer
//! wins. Used by tests and by embedders that bring their own
//! persistence later.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use fwforge_errors::{Error, StorageError};
use fwforge_types::{Device, OwnerRecord};

use crate::traits::{
    ApiKeyProvider, BuildLogEntry, BuildLogStore, DeviceStore, EnvProvider, PlatformDetector,
    SourceField, StatsEvent, StatsSink,
};

/// Devices keyed by udid.
#[derive(Debug, Default)]
pub struct MemoryDeviceStore {
    devices: DashMap<String, Device>,
}

impl MemoryDeviceStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, device: Device) {
        self.devices.insert(device.udid.clone(), device);
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn get(&self, udid: &str) -> Result<Device, Error> {
        self.devices
            .get(udid)
            .map(|d| d.clone())
            .ok_or_else(|| {
                StorageError::DeviceNotFound {
                    udid: udid.to_string(),
                }
                .into()
            })
    }

    async fn list_by_owner(&self, owner: &str) -> Result<Vec<Device>, Error> {
        Ok(self
            .devices
            .iter()
            .filter(|entry| entry.owner == owner)
            .map(|entry| entry.clone())
            .collect())
    }

    async fn set_current_build(&self, udid: &str, build_id: &str) -> Result<(), Error> {
        let mut device = self.devices.get_mut(udid).ok_or_else(|| {
            Error::from(StorageError::DeviceNotFound {
                udid: udid.to_string(),
            })
        })?;
        device.build_id = Some(build_id.to_string());
        Ok(())
    }
}

/// Owner records keyed by owner id.
#[derive(Debug, Default)]
pub struct MemoryOwnerStore {
    owners: DashMap<String, OwnerRecord>,
}

impl MemoryOwnerStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: OwnerRecord) {
        self.owners.insert(record.id.clone(), record);
    }
}

#[async_trait]
impl OwnerStore for MemoryOwnerStore {
    async fn get(&self, owner: &str) -> Result<OwnerRecord, Error> {
        self.owners
            .get(owner)
            .map(|o| o.clone())
            .ok_or_else(|| {
                StorageError::OwnerNotFound {
                    owner: owner.to_string(),
                }
                .into()
            })
    }

    async fn update_source(
        &self,
        owner: &str,
        source_id: &str,
        field: SourceField,
    ) -> Result<(), Error> {
        let mut record = self.owners.get_mut(owner).ok_or_else(|| {
            Error::from(StorageError::OwnerNotFound {
                owner: owner.to_string(),
            })
        })?;
        let source = record
            .repos
            .iter_mut()
            .find(|(sid, _)| sid.contains(source_id))
            .map(|(_, source)| source)
            .ok_or_else(|| {
                Error::from(StorageError::SourceNotFound {
                    source_id: source_id.to_string(),
                })
            })?;
        match field {
            SourceField::IsPrivate(v) => source.is_private = v,
            SourceField::LastBuild(v) => source.last_build = Some(v),
        }
        Ok(())
    }
}

/// API keys per owner, newest last.
#[derive(Debug, Default)]
pub struct MemoryApiKeys {
    keys: DashMap<String, Vec<String>>,
}

impl MemoryApiKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, owner: &str, key: impl Into<String>) {
        self.keys.entry(owner.to_string()).or_default().push(key.into());
    }
}

#[async_trait]
impl ApiKeyProvider for MemoryApiKeys {
    async fn last_api_key(&self, owner: &str) -> Result<Option<String>, Error> {
        Ok(self
            .keys
            .get(owner)
            .and_then(|keys| keys.last().cloned()))
    }
}

/// Owner environment variables.
#[derive(Debug, Default)]
pub struct MemoryEnvs {
    envs: DashMap<String, Vec<(String, String)>>,
}

impl MemoryEnvs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, owner: &str, key: impl Into<String>, value: impl Into<String>) {
        self.envs
            .entry(owner.to_string())
            .or_default()
            .push((key.into(), value.into()));
    }
}

#[async_trait]
impl EnvProvider for MemoryEnvs {
    async fn list(&self, owner: &str) -> Result<Vec<(String, String)>, Error> {
        Ok(self.envs.get(owner).map(|e| e.clone()).unwrap_or_default())
    }
}

/// Build log keyed by build id.
#[derive(Debug, Default)]
pub struct MemoryBuildLog {
    entries: DashMap<String, BuildLogEntry>,
}

impl MemoryBuildLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BuildLogStore for MemoryBuildLog {
    async fn log(
        &self,
        build_id: &str,
        owner: &str,
        udid: &str,
        state: &str,
    ) -> Result<(), Error> {
        self.entries.insert(
            build_id.to_string(),
            BuildLogEntry {
                build_id: build_id.to_string(),
                owner: owner.to_string(),
                udid: udid.to_string(),
                state: state.to_string(),
                timestamp: Utc::now(),
            },
        );
        Ok(())
    }

    async fn state(
        &self,
        build_id: &str,
        owner: &str,
        udid: &str,
        state: &str,
    ) -> Result<(), Error> {
        match self.entries.get_mut(build_id) {
            Some(mut entry) => {
                entry.state = state.to_string();
                entry.timestamp = Utc::now();
                Ok(())
            }
            // state() may race the initial log() write; upsert rather
            // than lose the terminal state
            None => self.log(build_id, owner, udid, state).await,
        }
    }

    async fn get(&self, build_id: &str) -> Result<Option<BuildLogEntry>, Error> {
        Ok(self.entries.get(build_id).map(|e| e.clone()))
    }
}

/// Counter-per-event metrics sink.
#[derive(Debug, Default)]
pub struct MemoryStats {
    counters: DashMap<String, u64>,
}

impl MemoryStats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count(&self, event: StatsEvent) -> u64 {
        self.counters
            .get(&event.to_string())
            .map_or(0, |c| *c)
    }
}

impl StatsSink for MemoryStats {
    fn stats_log(&self, owner: &str, event: StatsEvent, build_id: &str) {
        tracing::debug!(owner, %event, build_id, "stats");
        *self.counters.entry(event.to_string()).or_insert(0) += 1;
    }
}

/// Detector stub returning a fixed platform; handy in tests.
#[derive(Debug, Clone)]
pub struct FixedPlatform(pub String);

#[async_trait]
impl PlatformDetector for FixedPlatform {
    async fn detect(&self, _path: &Path) -> Result<String, Error> {
        Ok(self.0.clone())
    }
}
