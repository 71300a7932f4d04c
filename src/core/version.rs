use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::task::TaskId;

/// Sequence number of a version within its task.
///
/// Allocation is append-only: a new version always receives one more than the
/// current maximum, starting at 1 for the implicit first version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct VersionId(pub u32);

impl VersionId {
    pub const FIRST: VersionId = VersionId(1);
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Fully-qualified reference to a version.
///
/// Version ids are task-scoped, so anything that outlives a borrow of the
/// task (history records, busy tracking) keys on this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionRef {
    pub task: TaskId,
    pub version: VersionId,
}

impl fmt::Display for VersionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.task, self.version)
    }
}

/// A single entry in a task's version timeline.
///
/// Versions are immutable once created except through the task's
/// amend-active operation, which edits the newest version in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Version {
    pub id: VersionId,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default)]
    pub user_prompt: String,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn new(id: VersionId, description: &str, system_prompt: &str, user_prompt: &str) -> Self {
        Version {
            id,
            description: description.to_string(),
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            created_at: Utc::now(),
        }
    }
}
