use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use super::version::{Version, VersionId, VersionRef};
use crate::errors::{Error, Result};

/// Opaque unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }

    /// Parses a task id from its string form.
    pub fn parse(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(TaskId)
            .map_err(|_| Error::not_found(format!("no task with id '{}'", s)))
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named collection of prompt versions with shared variable defaults.
///
/// The version timeline is append-only and never empty: creating a task seeds
/// an implicit first version. `modified_at` is bumped by every mutation of
/// the task or any of its versions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    /// Default values for template variables, shared by all versions.
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub versions: Vec<Version>,
}

impl Task {
    /// Creates a task with the implicit first version.
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Task {
            id: TaskId::new(),
            name: name.to_string(),
            created_at: now,
            modified_at: now,
            variables: HashMap::new(),
            versions: vec![Version::new(VersionId::FIRST, "Initial version", "", "")],
        }
    }

    fn touch(&mut self) {
        self.modified_at = Utc::now();
    }

    /// Appends a new version with a freshly allocated sequence id and makes
    /// it the active version.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` if both prompt fields are empty.
    pub fn create_version(
        &mut self,
        description: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<&Version> {
        if system_prompt.trim().is_empty() && user_prompt.trim().is_empty() {
            return Err(Error::validation(
                "a new version needs a system prompt or a user prompt",
            ));
        }

        let next = VersionId(self.max_version_id().0 + 1);
        self.versions
            .push(Version::new(next, description, system_prompt, user_prompt));
        self.touch();
        Ok(self.versions.last().expect("versions is never empty"))
    }

    /// Edits the active version in place. Fields left as `None` are kept.
    ///
    /// This is the auto-save path: it never allocates a new version id.
    pub fn amend_active(
        &mut self,
        description: Option<&str>,
        system_prompt: Option<&str>,
        user_prompt: Option<&str>,
    ) {
        let version = self.versions.last_mut().expect("versions is never empty");
        if let Some(description) = description {
            version.description = description.to_string();
        }
        if let Some(system_prompt) = system_prompt {
            version.system_prompt = system_prompt.to_string();
        }
        if let Some(user_prompt) = user_prompt {
            version.user_prompt = user_prompt.to_string();
        }
        self.touch();
    }

    /// The version timeline, oldest first.
    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    /// Looks up a version by id.
    pub fn version(&self, id: VersionId) -> Result<&Version> {
        self.versions.iter().find(|v| v.id == id).ok_or_else(|| {
            Error::not_found(format!("task '{}' has no version {}", self.name, id))
        })
    }

    /// The most recently created version, target of amend and the default
    /// target for execution.
    pub fn active_version(&self) -> &Version {
        self.versions.last().expect("versions is never empty")
    }

    /// Upserts a variable default. The name does not need to appear in any
    /// version's text: stale defaults persist for reuse across versions.
    pub fn set_variable(&mut self, name: &str, value: &str) {
        self.variables
            .insert(name.to_string(), value.to_string());
        self.touch();
    }

    /// Fully-qualified reference to one of this task's versions.
    pub fn version_ref(&self, id: VersionId) -> VersionRef {
        VersionRef {
            task: self.id,
            version: id,
        }
    }

    /// References to every version, for cascade deletion.
    pub fn version_refs(&self) -> Vec<VersionRef> {
        self.versions.iter().map(|v| self.version_ref(v.id)).collect()
    }

    fn max_version_id(&self) -> VersionId {
        self.versions
            .iter()
            .map(|v| v.id)
            .max()
            .unwrap_or(VersionId(0))
    }
}
