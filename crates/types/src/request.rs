//! Build request types

use fwforge_events::WorkerHandle;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Node id for time-ordered build ids. The value itself is irrelevant;
/// the timestamp half of the uuid provides the ordering.
const BUILD_ID_NODE: [u8; 6] = [0x66, 0x77, 0x66, 0x6f, 0x72, 0x67];

/// Generate a fresh time-ordered build id (36-char uuid).
#[must_use]
pub fn new_build_id() -> String {
    Uuid::now_v1(&BUILD_ID_NODE).to_string()
}

/// Incoming build trigger, as resolved by the API layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildTrigger {
    pub udid: Option<String>,
    pub source_id: Option<String>,
    #[serde(default)]
    pub dryrun: bool,
}

/// Ephemeral per-invocation build request.
///
/// Constructed at the start of `build()`, passed by value through
/// `run_build()`, and discarded once the pipeline accepts or rejects
/// the build. Durable state lives in the device record and the build
/// log, never here. `worker` is `None` for local execution.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub build_id: String,
    pub source_id: String,
    pub owner: String,
    pub git: String,
    pub branch: String,
    pub udid: String,
    pub dryrun: bool,
    pub worker: Option<WorkerHandle>,
    pub is_private: bool,
}

/// Acceptance payload returned once the build has been handed to an
/// executor. Signals "started", not "completed" — terminal status flows
/// through the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildStarted {
    pub response: String,
    pub build_id: String,
}

impl BuildStarted {
    #[must_use]
    pub fn new(build_id: impl Into<String>) -> Self {
        Self {
            response: "build_started".to_string(),
            build_id: build_id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::new_build_id;

    #[test]
    fn build_ids_are_uuid_shaped() {
        let id = new_build_id();
        assert_eq!(id.len(), 36);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn build_ids_are_unique() {
        assert_ne!(new_build_id(), new_build_id());
    }
}
