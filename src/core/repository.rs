use tracing::debug;

use super::task::{Task, TaskId};
use super::version::VersionRef;
use crate::errors::{Error, Result};

/// Owns the set of tasks and enforces id uniqueness and cascade deletion.
///
/// Tasks are kept in creation order; ordered listings sort on demand. All
/// mutations are synchronous and either fully apply or leave the repository
/// unchanged.
#[derive(Debug, Default)]
pub struct TaskRepository {
    tasks: Vec<Task>,
}

impl TaskRepository {
    pub fn new() -> Self {
        TaskRepository { tasks: Vec::new() }
    }

    /// Rebuilds a repository from persisted tasks.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        TaskRepository { tasks }
    }

    /// Creates a task with a fresh id and the implicit first version.
    ///
    /// Duplicate names are permitted: uniqueness is by id, and warning about
    /// a name collision is the caller's concern.
    pub fn create_task(&mut self, name: &str) -> Result<&Task> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("task name must not be empty"));
        }

        let task = Task::new(name);
        debug!("created task '{}' ({})", task.name, task.id);
        self.tasks.push(task);
        Ok(self.tasks.last().expect("just pushed"))
    }

    /// Removes a task, returning it together with the references of every
    /// version it owned so the caller can cascade the history ledger and
    /// commit both removals in a single persisted write.
    pub fn delete_task(&mut self, id: TaskId) -> Result<(Task, Vec<VersionRef>)> {
        let idx = self
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| Error::not_found(format!("no task with id '{}'", id)))?;
        let task = self.tasks.remove(idx);
        let refs = task.version_refs();
        debug!("deleted task '{}' and {} versions", task.name, refs.len());
        Ok((task, refs))
    }

    /// Renames a task. Always succeeds for a non-empty name.
    pub fn rename_task(&mut self, id: TaskId, new_name: &str) -> Result<()> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            return Err(Error::validation("task name must not be empty"));
        }
        let task = self.get_mut(id)?;
        task.name = new_name.to_string();
        task.modified_at = chrono::Utc::now();
        Ok(())
    }

    /// Upserts a variable default on a task.
    pub fn set_variable_default(&mut self, id: TaskId, name: &str, value: &str) -> Result<()> {
        self.get_mut(id)?.set_variable(name, value);
        Ok(())
    }

    /// Tasks sorted by `modified_at` descending, most recently touched first.
    pub fn list_tasks(&self) -> Vec<&Task> {
        let mut tasks: Vec<&Task> = self.tasks.iter().collect();
        tasks.sort_by(|a, b| b.modified_at.cmp(&a.modified_at));
        tasks
    }

    pub fn get(&self, id: TaskId) -> Result<&Task> {
        self.tasks
            .iter()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(format!("no task with id '{}'", id)))
    }

    pub fn get_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::not_found(format!("no task with id '{}'", id)))
    }

    /// Tasks in creation order, for persistence.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Whether another task already uses this display name.
    pub fn name_in_use(&self, name: &str) -> bool {
        self.tasks.iter().any(|t| t.name == name)
    }

    /// Tasks whose display name matches exactly.
    pub fn find_by_name(&self, name: &str) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.name == name).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_task_rejects_blank_names() {
        let mut repo = TaskRepository::new();
        assert!(matches!(repo.create_task("   "), Err(Error::Validation(_))));
        assert!(repo.is_empty());
    }

    #[test]
    fn duplicate_names_get_distinct_ids() {
        let mut repo = TaskRepository::new();
        let a = repo.create_task("Blog").unwrap().id;
        let b = repo.create_task("Blog").unwrap().id;
        assert_ne!(a, b);
        assert_eq!(repo.len(), 2);
        assert!(repo.name_in_use("Blog"));
        assert_eq!(repo.find_by_name("Blog").len(), 2);
    }

    #[test]
    fn rename_validates_and_applies() {
        let mut repo = TaskRepository::new();
        let id = repo.create_task("Old").unwrap().id;
        assert!(matches!(
            repo.rename_task(id, ""),
            Err(Error::Validation(_))
        ));
        assert_eq!(repo.get(id).unwrap().name, "Old");

        repo.rename_task(id, "New").unwrap();
        assert_eq!(repo.get(id).unwrap().name, "New");
    }

    #[test]
    fn delete_returns_all_version_refs() {
        let mut repo = TaskRepository::new();
        let id = repo.create_task("Blog").unwrap().id;
        repo.get_mut(id)
            .unwrap()
            .create_version("v2", "", "text")
            .unwrap();

        let (task, refs) = repo.delete_task(id).unwrap();
        assert_eq!(task.id, id);
        assert_eq!(refs.len(), 2);
        assert!(refs.iter().all(|r| r.task == id));
        assert!(matches!(repo.get(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn delete_unknown_task_is_not_found() {
        let mut repo = TaskRepository::new();
        assert!(matches!(
            repo.delete_task(TaskId::new()),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn list_orders_by_modified_at_descending() {
        let mut repo = TaskRepository::new();
        let first = repo.create_task("first").unwrap().id;
        let second = repo.create_task("second").unwrap().id;
        // touch the older task so it sorts to the front
        repo.set_variable_default(first, "topic", "AI").unwrap();

        let listed: Vec<TaskId> = repo.list_tasks().iter().map(|t| t.id).collect();
        assert_eq!(listed, vec![first, second]);
    }

    #[test]
    fn stale_variable_defaults_are_allowed() {
        let mut repo = TaskRepository::new();
        let id = repo.create_task("Blog").unwrap().id;
        // "audience" appears in no version text; the default still persists
        repo.set_variable_default(id, "audience", "devs").unwrap();
        assert_eq!(
            repo.get(id).unwrap().variables.get("audience").map(String::as_str),
            Some("devs")
        );
    }
}
