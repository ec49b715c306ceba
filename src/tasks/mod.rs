pub mod args;
pub mod types;

use std::collections::HashMap;

use types::{StoredTask, Task, TaskView};

/// Owns every task record, keyed by id and kept in creation order.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: HashMap<String, Task>,
    order: Vec<String>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut registry = Self::new();
        for task in tasks {
            registry.insert(task);
        }
        registry
    }

    /// Inserts a task, replacing any record with the same id in place.
    pub fn insert(&mut self, task: Task) -> Option<Task> {
        let id = task.id.clone();
        let previous = self.tasks.insert(id.clone(), task);
        if previous.is_none() {
            self.order.push(id);
        }
        previous
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Task> {
        self.tasks.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let task = self.tasks.remove(id)?;
        self.order.retain(|existing| existing != id);
        Some(task)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Unordered mutable access, for sweeps where order does not matter.
    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut Task> {
        self.tasks.values_mut()
    }

    pub fn snapshot(&self) -> Vec<TaskView> {
        self.iter().map(Task::view).collect()
    }

    pub fn stored(&self) -> Vec<StoredTask> {
        self.iter().map(Task::stored).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::{TaskConfig, TaskStatus};

    fn task(id: &str) -> Task {
        Task::new(id.into(), TaskConfig::default())
    }

    #[test]
    fn keeps_creation_order() {
        let registry = TaskRegistry::from_tasks([task("c"), task("a"), task("b")]);
        let ids: Vec<_> = registry.snapshot().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
    }

    #[test]
    fn reinsert_replaces_without_duplicating() {
        let mut registry = TaskRegistry::from_tasks([task("a"), task("b")]);
        let mut replacement = task("a");
        replacement.status = TaskStatus::FailedToStart;
        assert!(registry.insert(replacement).is_some());
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().status, TaskStatus::FailedToStart);
    }

    #[test]
    fn remove_missing_is_noop() {
        let mut registry = TaskRegistry::from_tasks([task("a")]);
        assert!(registry.remove("zzz").is_none());
        assert!(registry.remove("a").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn default_name_uses_id_prefix() {
        let t = Task::new("abcdef123456".into(), TaskConfig::default());
        assert_eq!(t.name, "Task abcdef");

        let named = Task::new(
            "abcdef123456".into(),
            TaskConfig {
                name: Some("office".into()),
                ..TaskConfig::default()
            },
        );
        assert_eq!(named.name, "office");
    }

    #[test]
    fn stored_record_loads_as_stopped() {
        let mut t = task("a");
        t.status = TaskStatus::Running;
        t.url = "http://localhost:8080".into();
        let loaded = Task::from(t.stored());
        assert_eq!(loaded.status, TaskStatus::Stopped);
        assert!(loaded.url.is_empty());
        assert!(loaded.process.is_none());
    }
}
