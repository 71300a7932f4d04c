//! Core data model: tasks, their version timelines, the template variable
//! engine and the execution history ledger.

mod history;
mod record;
mod repository;
mod task;
pub mod template;
mod version;

pub use history::{HistoryLedger, DEFAULT_HISTORY_LIMIT};
pub use record::{ErrorKind, ExecutionRecord, Outcome, RecordId, TokenUsage};
pub use repository::TaskRepository;
pub use task::{Task, TaskId};
pub use version::{Version, VersionId, VersionRef};
