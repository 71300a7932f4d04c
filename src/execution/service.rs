use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::config::Endpoint;
use crate::core::{template, ExecutionRecord, Outcome, RecordId, Task, VersionId, VersionRef};
use crate::errors::{Error, Result};
use crate::llm::{ChatMessage, CompletionClient, HttpCompletionClient};

/// Phases of a single execution. `Succeeded` and `Failed` are terminal and
/// each produces exactly one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionState {
    Idle,
    Rendering,
    Dispatching,
    Succeeded,
    Failed,
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExecutionState::Idle => "Idle",
            ExecutionState::Rendering => "Rendering",
            ExecutionState::Dispatching => "Dispatching",
            ExecutionState::Succeeded => "Succeeded",
            ExecutionState::Failed => "Failed",
        };
        write!(f, "{}", name)
    }
}

/// Orchestrates render, dispatch and record construction for prompt
/// executions.
///
/// At most one execution may be in flight per version: a second call for the
/// same version is rejected with `Error::Busy` instead of being queued.
/// Executions for different versions proceed concurrently, so the service is
/// normally shared behind an `Arc`.
#[derive(Debug)]
pub struct ExecutionService {
    client: Box<dyn CompletionClient>,
    in_flight: Mutex<HashSet<VersionRef>>,
}

impl ExecutionService {
    pub fn new(client: Box<dyn CompletionClient>) -> Self {
        ExecutionService {
            client,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Service backed by the HTTP completion client.
    pub fn http() -> Self {
        Self::new(Box::new(HttpCompletionClient::new()))
    }

    /// Whether an execution is currently in flight for this version.
    pub fn is_busy(&self, version: VersionRef) -> bool {
        self.lock_in_flight().contains(&version)
    }

    /// Runs one execution to a terminal state.
    ///
    /// Run-time `overrides` take precedence over the task's stored variable
    /// defaults. An empty rendered user prompt short-circuits with a
    /// `Validation` error before any network call. Every dispatch fault is
    /// captured into the returned record's outcome; the only error returns
    /// are `Busy`, `NotFound` (stale version id) and the short-circuit.
    pub async fn execute(
        &self,
        task: &Task,
        version_id: VersionId,
        endpoint: &Endpoint,
        overrides: &HashMap<String, String>,
    ) -> Result<ExecutionRecord> {
        let version = task.version(version_id)?;
        let slot = self.claim(task.version_ref(version_id))?;

        debug!("execution {}: {}", slot.version, ExecutionState::Rendering);
        let mut inputs = task.variables.clone();
        inputs.extend(overrides.clone());

        let rendered_system = template::render(&version.system_prompt, &inputs);
        let rendered_user = template::render(&version.user_prompt, &inputs);

        if rendered_user.trim().is_empty() {
            return Err(Error::validation(
                "rendered user prompt is empty, nothing to dispatch",
            ));
        }

        let mut messages = Vec::with_capacity(2);
        if !rendered_system.trim().is_empty() {
            messages.push(ChatMessage::system(&rendered_system));
        }
        messages.push(ChatMessage::user(&rendered_user));

        debug!(
            "execution {}: {} to {}",
            slot.version,
            ExecutionState::Dispatching,
            endpoint.name
        );
        let outcome = match self.client.complete(endpoint, &messages).await {
            Ok(completion) => Outcome::Success {
                response: completion.content,
                usage: completion.usage,
            },
            Err(failure) => {
                warn!(
                    "execution {} failed ({}): {}",
                    slot.version, failure.kind, failure.message
                );
                Outcome::Failure {
                    kind: failure.kind,
                    message: failure.message,
                }
            }
        };

        let terminal = if outcome.is_success() {
            ExecutionState::Succeeded
        } else {
            ExecutionState::Failed
        };
        debug!("execution {}: {}", slot.version, terminal);

        Ok(ExecutionRecord {
            id: RecordId::new(),
            version: slot.version,
            executed_at: Utc::now(),
            inputs,
            rendered_prompt: rendered_user,
            model: endpoint.model.clone(),
            outcome,
        })
    }

    /// Claims the in-flight slot for a version, or reports `Busy`.
    fn claim(&self, version: VersionRef) -> Result<InFlightSlot<'_>> {
        let mut in_flight = self.lock_in_flight();
        if !in_flight.insert(version) {
            return Err(Error::Busy {
                task: version.task,
                version: version.version,
            });
        }
        Ok(InFlightSlot {
            service: self,
            version,
        })
    }

    fn lock_in_flight(&self) -> std::sync::MutexGuard<'_, HashSet<VersionRef>> {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds a version's in-flight slot; released on every exit path, including
/// the pre-dispatch short-circuit.
struct InFlightSlot<'a> {
    service: &'a ExecutionService,
    version: VersionRef,
}

impl Drop for InFlightSlot<'_> {
    fn drop(&mut self) {
        self.service.lock_in_flight().remove(&self.version);
    }
}
