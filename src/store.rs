use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::AppError;
use crate::tasks::types::{StoredTask, Task};

/// JSON file holding the task list between runs.
#[derive(Clone, Debug)]
pub struct TaskStore {
    path: PathBuf,
}

impl TaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every stored task as Stopped. A missing or unreadable file
    /// yields an empty list.
    pub fn load(&self) -> Vec<Task> {
        match self.read() {
            Ok(stored) => {
                debug!(path = %self.path.display(), count = stored.len(), "loaded tasks");
                stored.into_iter().map(Task::from).collect()
            }
            Err(AppError::Persist { source, .. }) if source.kind() == ErrorKind::NotFound => {
                Vec::new()
            }
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring task store: {}", e);
                Vec::new()
            }
        }
    }

    /// Reads record by record, so one bad entry does not take the others
    /// down with it.
    fn read(&self) -> Result<Vec<StoredTask>, AppError> {
        let raw = fs::read_to_string(&self.path).map_err(|e| AppError::persist(&self.path, e))?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                self.keep_copy();
                return Err(e.into());
            }
        };
        let total = records.len();
        let stored: Vec<StoredTask> = records
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(task) => Some(task),
                Err(e) => {
                    warn!(path = %self.path.display(), index, "skipping unreadable task record: {}", e);
                    None
                }
            })
            .collect();
        if stored.len() < total {
            self.keep_copy();
        }
        Ok(stored)
    }

    /// The next save rewrites the file from what could be read, so keep the
    /// original next to it.
    fn keep_copy(&self) {
        let backup = self.sibling(".bak");
        match fs::copy(&self.path, &backup) {
            Ok(_) => warn!(backup = %backup.display(), "kept a copy of the unreadable task store"),
            Err(e) => warn!(backup = %backup.display(), "failed to back up task store: {}", e),
        }
    }

    /// Replaces the whole file. Writes a sibling temp file first so a failed
    /// write leaves the previous contents intact.
    pub fn save(&self, tasks: &[StoredTask]) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| AppError::persist(parent, e))?;
        }

        let json = serde_json::to_string_pretty(tasks)?;
        let tmp = self.sibling(".tmp");
        fs::write(&tmp, json).map_err(|e| AppError::persist(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            AppError::persist(&self.path, e)
        })?;

        debug!(path = %self.path.display(), count = tasks.len(), "saved tasks");
        Ok(())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "tasks.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }
}
