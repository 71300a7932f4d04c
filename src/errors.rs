use crate::core::{TaskId, VersionId};

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by repository, version and execution operations.
///
/// Dispatch-time faults (timeouts, HTTP errors, malformed responses) are not
/// represented here: they are captured into the execution record's outcome so
/// that failed attempts remain part of the history.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Bad input, recoverable locally. State is left unchanged.
    #[error("validation error: {0}")]
    Validation(String),

    /// A stale id reference. State is left unchanged.
    #[error("not found: {0}")]
    NotFound(String),

    /// An execution is already in flight for this version.
    #[error("execution already in flight for {version} of task {task}")]
    Busy { task: TaskId, version: VersionId },

    /// The persisted store exists but cannot be read or parsed.
    #[error("persisted state is unreadable: {0}")]
    CorruptState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for a validation failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Shorthand for a missing-reference failure.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }
}
