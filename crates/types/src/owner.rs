//! Owner record and stored source types

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A registered (repository URL, branch) pair belonging to an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    pub branch: String,
    /// Learned at fetch time: once a private fetch succeeds, future
    /// builds skip the public attempt.
    #[serde(default)]
    pub is_private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_build: Option<String>,
}

/// Owner document as read by the build engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Owner-specific transmit key; overrides the global one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmit_key: Option<String>,
    /// Stored sources keyed by source id.
    #[serde(default)]
    pub repos: HashMap<String, SourceRecord>,
}

impl OwnerRecord {
    /// Find the first stored source matching the given source id.
    #[must_use]
    pub fn source(&self, source_id: &str) -> Option<(&String, &SourceRecord)> {
        self.repos.iter().find(|(sid, _)| sid.contains(source_id))
    }
}
