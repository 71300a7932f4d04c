mod service;

pub use service::{ExecutionService, ExecutionState};
