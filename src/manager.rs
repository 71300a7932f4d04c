use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::{Endpoint, EndpointsConfig};
use crate::core::{
    ExecutionRecord, HistoryLedger, RecordId, Task, TaskId, TaskRepository, Version, VersionId,
};
use crate::errors::{Error, Result};
use crate::event::Event;
use crate::execution::ExecutionService;
use crate::llm::CompletionClient;
use crate::store::FileStore;

/// Facade over the task repository, history ledger, endpoint configuration
/// and execution service.
///
/// Every mutating operation persists before returning, so the on-disk state
/// always reflects the last completed operation. The manager itself is the
/// single-threaded control path for data mutations; only execution dispatch
/// suspends.
#[derive(Debug)]
pub struct PromptManager {
    repository: TaskRepository,
    ledger: HistoryLedger,
    endpoints: EndpointsConfig,
    store: FileStore,
    service: Arc<ExecutionService>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl PromptManager {
    /// Opens the manager over a data directory, dispatching over HTTP.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(data_dir, ExecutionService::http())
    }

    /// Opens the manager with a custom completion client.
    pub fn open_with_client(
        data_dir: impl AsRef<Path>,
        client: Box<dyn CompletionClient>,
    ) -> Result<Self> {
        Self::open_with(data_dir, ExecutionService::new(client))
    }

    fn open_with(data_dir: impl AsRef<Path>, service: ExecutionService) -> Result<Self> {
        let store = FileStore::new(data_dir.as_ref())?;

        // Backup-and-reset policy: an unreadable store is preserved under a
        // timestamped name and the manager starts empty instead of crashing.
        let state = match store.load_state() {
            Ok(state) => state,
            Err(Error::CorruptState(msg)) => {
                warn!("task store is unreadable ({}), starting empty", msg);
                store.backup_corrupt_state()?;
                Default::default()
            }
            Err(e) => return Err(e),
        };
        let endpoints = match store.load_config() {
            Ok(config) => config,
            Err(Error::CorruptState(msg)) => {
                warn!("endpoint config is unreadable ({}), starting empty", msg);
                store.backup_corrupt_config()?;
                EndpointsConfig::default()
            }
            Err(e) => return Err(e),
        };

        info!(
            "loaded {} tasks and {} execution records",
            state.tasks.len(),
            state.records.len()
        );
        Ok(PromptManager {
            repository: TaskRepository::from_tasks(state.tasks),
            ledger: HistoryLedger::from_records(state.records),
            endpoints,
            store,
            service: Arc::new(service),
            events: None,
        })
    }

    /// Registers for execution lifecycle notifications.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    fn emit(&self, event: Event) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn persist(&self) -> Result<()> {
        self.store
            .save_state(self.repository.tasks(), self.ledger.records())
    }

    // ------------------------------------------------------------------
    // Tasks
    // ------------------------------------------------------------------

    pub fn create_task(&mut self, name: &str) -> Result<Task> {
        let task = self.repository.create_task(name)?.clone();
        self.persist()?;
        Ok(task)
    }

    pub fn rename_task(&mut self, id: TaskId, new_name: &str) -> Result<()> {
        self.repository.rename_task(id, new_name)?;
        self.persist()
    }

    /// Deletes a task together with all its versions and their execution
    /// records. Both removals are committed in a single atomic save, so a
    /// crash mid-delete cannot leave orphaned records.
    pub fn delete_task(&mut self, id: TaskId) -> Result<Task> {
        let (task, refs) = self.repository.delete_task(id)?;
        self.ledger.remove_versions(&refs);
        self.persist()?;
        info!("deleted task '{}'", task.name);
        Ok(task)
    }

    pub fn set_variable_default(&mut self, id: TaskId, name: &str, value: &str) -> Result<()> {
        self.repository.set_variable_default(id, name, value)?;
        self.persist()
    }

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.repository.get(id)
    }

    /// Tasks sorted most recently modified first.
    pub fn list_tasks(&self) -> Vec<&Task> {
        self.repository.list_tasks()
    }

    /// Whether a display name is already taken (callers may warn; creation
    /// itself never fails on a collision).
    pub fn name_in_use(&self, name: &str) -> bool {
        self.repository.name_in_use(name)
    }

    /// Resolves a task id or an unambiguous display name.
    pub fn resolve_task(&self, selector: &str) -> Result<TaskId> {
        if let Ok(id) = TaskId::parse(selector) {
            if self.repository.get(id).is_ok() {
                return Ok(id);
            }
        }
        let matches = self.repository.find_by_name(selector);
        match matches.len() {
            0 => Err(Error::not_found(format!("no task named '{}'", selector))),
            1 => Ok(matches[0].id),
            n => Err(Error::validation(format!(
                "{} tasks are named '{}', use the id instead",
                n, selector
            ))),
        }
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    pub fn create_version(
        &mut self,
        task_id: TaskId,
        description: &str,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Version> {
        let version = self
            .repository
            .get_mut(task_id)?
            .create_version(description, system_prompt, user_prompt)?
            .clone();
        self.persist()?;
        Ok(version)
    }

    /// The auto-save path: edits the active version in place.
    pub fn amend_active(
        &mut self,
        task_id: TaskId,
        description: Option<&str>,
        system_prompt: Option<&str>,
        user_prompt: Option<&str>,
    ) -> Result<()> {
        self.repository
            .get_mut(task_id)?
            .amend_active(description, system_prompt, user_prompt);
        self.persist()
    }

    // ------------------------------------------------------------------
    // Execution and history
    // ------------------------------------------------------------------

    /// Executes a version against the active endpoint and records the
    /// outcome.
    ///
    /// `version` defaults to the task's active version. The caller is only
    /// ever handed `Busy`, `NotFound` or a pre-dispatch `Validation`;
    /// dispatch faults come back inside the record.
    pub async fn execute(
        &mut self,
        task_id: TaskId,
        version: Option<VersionId>,
        overrides: &HashMap<String, String>,
    ) -> Result<ExecutionRecord> {
        let endpoint = self
            .endpoints
            .active_endpoint()
            .cloned()
            .ok_or_else(|| Error::validation("no active endpoint configured"))?;

        let task = self.repository.get(task_id)?.clone();
        let version_id = version.unwrap_or(task.active_version().id);

        self.emit(Event::ExecutionStarted {
            task: task.id,
            version: version_id,
        });

        let record = self
            .service
            .execute(&task, version_id, &endpoint, overrides)
            .await?;

        self.ledger.append(record.clone());
        self.persist()?;
        self.emit(Event::ExecutionFinished {
            record: record.clone(),
        });
        Ok(record)
    }

    /// A shareable handle on the execution service, for callers that drive
    /// concurrent executions themselves.
    pub fn execution_service(&self) -> Arc<ExecutionService> {
        self.service.clone()
    }

    /// Execution records for a version, newest first, skipping the `offset`
    /// newest for paging. `version` defaults to the task's active version.
    pub fn history(
        &self,
        task_id: TaskId,
        version: Option<VersionId>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<&ExecutionRecord>> {
        let task = self.repository.get(task_id)?;
        let version_id = match version {
            Some(id) => task.version(id)?.id,
            None => task.active_version().id,
        };
        Ok(self
            .ledger
            .list_range(task.version_ref(version_id), offset, limit))
    }

    pub fn record(&self, id: RecordId) -> Result<&ExecutionRecord> {
        self.ledger.get(id)
    }

    // ------------------------------------------------------------------
    // Endpoints
    // ------------------------------------------------------------------

    pub fn add_endpoint(&mut self, endpoint: Endpoint) -> Result<()> {
        self.endpoints.add(endpoint)?;
        self.store.save_config(&self.endpoints)
    }

    pub fn use_endpoint(&mut self, name: &str) -> Result<()> {
        self.endpoints.set_active(name)?;
        self.store.save_config(&self.endpoints)
    }

    pub fn endpoints(&self) -> &EndpointsConfig {
        &self.endpoints
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ErrorKind, Outcome, DEFAULT_HISTORY_LIMIT};
    use crate::llm::{ChatMessage, Completion, CompletionError};
    use async_trait::async_trait;
    use tempfile::TempDir;

    #[derive(Debug)]
    struct OkClient;

    #[async_trait]
    impl CompletionClient for OkClient {
        async fn complete(
            &self,
            _endpoint: &Endpoint,
            _messages: &[ChatMessage],
        ) -> std::result::Result<Completion, CompletionError> {
            Ok(Completion {
                content: "canned response".into(),
                usage: None,
            })
        }
    }

    #[derive(Debug)]
    struct UnreachableClient;

    #[async_trait]
    impl CompletionClient for UnreachableClient {
        async fn complete(
            &self,
            _endpoint: &Endpoint,
            _messages: &[ChatMessage],
        ) -> std::result::Result<Completion, CompletionError> {
            Err(CompletionError {
                kind: ErrorKind::NetworkError,
                message: "connection refused".into(),
            })
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint {
            name: "main".into(),
            base_url: "https://api.example.com/v1".into(),
            api_key: "sk-test".into(),
            model: "test-model".into(),
            active: true,
        }
    }

    fn manager_with(dir: &TempDir, client: Box<dyn CompletionClient>) -> PromptManager {
        let mut manager = PromptManager::open_with_client(dir.path(), client).unwrap();
        manager.add_endpoint(endpoint()).unwrap();
        manager
    }

    #[test]
    fn mutations_survive_a_reopen() {
        let dir = TempDir::new().unwrap();
        let id = {
            let mut manager = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
            let id = manager.create_task("Blog").unwrap().id;
            manager
                .amend_active(id, None, None, Some("Write about {{topic}}"))
                .unwrap();
            manager.set_variable_default(id, "topic", "AI").unwrap();
            manager.rename_task(id, "Blog posts").unwrap();
            id
        };

        let manager = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        let task = manager.task(id).unwrap();
        assert_eq!(task.name, "Blog posts");
        assert_eq!(task.active_version().user_prompt, "Write about {{topic}}");
        assert_eq!(task.variables.get("topic").map(String::as_str), Some("AI"));
    }

    #[tokio::test]
    async fn execute_requires_an_active_endpoint() {
        let dir = TempDir::new().unwrap();
        let mut manager = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        let id = manager.create_task("Blog").unwrap().id;
        manager.amend_active(id, None, None, Some("hello")).unwrap();

        let err = manager.execute(id, None, &HashMap::new()).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn execute_appends_to_history_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with(&dir, Box::new(OkClient));
        let id = manager.create_task("Blog").unwrap().id;
        manager
            .amend_active(id, None, None, Some("Write about {{topic}}"))
            .unwrap();
        manager.set_variable_default(id, "topic", "AI").unwrap();

        let record = manager.execute(id, None, &HashMap::new()).await.unwrap();
        assert_eq!(record.outcome.response(), Some("canned response"));
        assert_eq!(record.rendered_prompt, "Write about AI");

        let listed = manager.history(id, None, 0, DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, record.id);

        // the record survives a reopen
        let reopened = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        assert!(reopened.record(record.id).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_yields_a_network_error_record() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with(&dir, Box::new(UnreachableClient));
        let id = manager.create_task("Blog").unwrap().id;
        manager.amend_active(id, None, None, Some("hello")).unwrap();

        let record = manager.execute(id, None, &HashMap::new()).await.unwrap();
        match &record.outcome {
            Outcome::Failure { kind, .. } => assert_eq!(*kind, ErrorKind::NetworkError),
            Outcome::Success { .. } => panic!("expected failure"),
        }

        // failed attempts are part of the history
        let listed = manager.history(id, None, 0, DEFAULT_HISTORY_LIMIT).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(!listed[0].outcome.is_success());
    }

    #[tokio::test]
    async fn delete_cascades_records_and_commits_atomically() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with(&dir, Box::new(OkClient));
        let id = manager.create_task("Blog").unwrap().id;
        manager.amend_active(id, None, None, Some("hello")).unwrap();
        let record = manager.execute(id, None, &HashMap::new()).await.unwrap();

        manager.delete_task(id).unwrap();

        assert!(matches!(manager.task(id), Err(Error::NotFound(_))));
        assert!(matches!(
            manager.history(id, None, 0, DEFAULT_HISTORY_LIMIT),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(manager.record(record.id), Err(Error::NotFound(_))));

        // the persisted document dropped the task and its records together
        let reopened = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        assert!(reopened.list_tasks().is_empty());
        assert!(matches!(
            reopened.record(record.id),
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn events_are_emitted_around_an_execution() {
        let dir = TempDir::new().unwrap();
        let mut manager = manager_with(&dir, Box::new(OkClient));
        let id = manager.create_task("Blog").unwrap().id;
        manager.amend_active(id, None, None, Some("hello")).unwrap();

        let mut events = manager.subscribe();
        let record = manager.execute(id, None, &HashMap::new()).await.unwrap();

        match events.try_recv().unwrap() {
            Event::ExecutionStarted { task, .. } => assert_eq!(task, id),
            other => panic!("unexpected event: {:?}", other),
        }
        match events.try_recv().unwrap() {
            Event::ExecutionFinished { record: finished } => assert_eq!(finished.id, record.id),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn corrupt_store_is_backed_up_and_reset() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("tasks.json"), "{ not json").unwrap();

        let manager = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        assert!(manager.list_tasks().is_empty());

        let backups: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains("corrupt"))
            .collect();
        assert_eq!(backups.len(), 1);
    }

    #[test]
    fn resolve_task_by_name_and_id() {
        let dir = TempDir::new().unwrap();
        let mut manager = PromptManager::open_with_client(dir.path(), Box::new(OkClient)).unwrap();
        let id = manager.create_task("Blog").unwrap().id;

        assert_eq!(manager.resolve_task("Blog").unwrap(), id);
        assert_eq!(manager.resolve_task(&id.to_string()).unwrap(), id);
        assert!(matches!(
            manager.resolve_task("missing"),
            Err(Error::NotFound(_))
        ));

        manager.create_task("Blog").unwrap();
        assert!(matches!(
            manager.resolve_task("Blog"),
            Err(Error::Validation(_))
        ));
    }
}
