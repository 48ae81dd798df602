#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Collaborator interfaces for the fwforge build engine
//!
//! The device, owner, API key, environment and build-log stores are
//! owned by the surrounding device-management platform; this crate pins
//! down the slice of their behavior the build engine consumes, as
//! object-safe async traits. The in-memory implementations back tests
//! and standalone embedding.

mod detector;
mod memory;
mod traits;

pub use detector::FsPlatformDetector;
pub use memory::{
    FixedPlatform, MemoryApiKeys, MemoryBuildLog, MemoryDeviceStore, MemoryEnvs, MemoryOwnerStore,
    MemoryStats,
};
pub use traits::{
    ApiKeyProvider, BuildLogEntry, BuildLogStore, DeviceStore, EnvProvider, PlatformDetector,
    SourceField, StatsEvent, StatsSink,
};
