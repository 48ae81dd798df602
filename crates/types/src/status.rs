//! Durable build status strings
//!
//! The build log stores free-form status strings (arbitrary failure
//! reasons included); the well-known ones are named here so call sites
//! and tests agree on spelling.

pub const STARTED: &str = "started";
pub const PULLING: &str = "Pulling repository";
pub const BUILDING: &str = "Building...";
pub const SUCCESS: &str = "Success";
pub const ERROR: &str = "error";
pub const FAILED: &str = "FAILED";
pub const OK: &str = "OK";
