#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! Core type definitions for fwforge
//!
//! Explicit tagged records for the control-flow objects the build
//! pipeline passes around: the ephemeral build request, the read-only
//! device record, the owner's stored source map, and the durable build
//! status strings.

pub mod device;
pub mod owner;
pub mod request;
pub mod status;

pub use device::{Device, DeviceEnvironment};
pub use owner::{OwnerRecord, SourceRecord};
pub use request::{new_build_id, BuildRequest, BuildStarted, BuildTrigger};
pub use uuid::Uuid;
