use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use parking_lot::Mutex;

use crate::error::AppError;
use crate::events::{LogLevel, Notification, NotificationSink, SYSTEM};
use crate::tasks::types::TaskView;

/// Lines kept across all tasks.
const GLOBAL_HISTORY: usize = 1000;

/// Prints notifications to stdout and keeps the recent log around, the way
/// the panel's log area does.
pub struct ConsoleSink {
    json: bool,
    per_task_limit: usize,
    list_requested: AtomicBool,
    inner: Mutex<ConsoleState>,
}

#[derive(Default)]
struct ConsoleState {
    per_task: HashMap<String, VecDeque<String>>,
    recent: VecDeque<String>,
    tasks: Vec<TaskView>,
}

impl ConsoleSink {
    pub fn new(json: bool, per_task_limit: usize) -> Self {
        Self {
            json,
            per_task_limit: per_task_limit.max(1),
            list_requested: AtomicBool::new(false),
            inner: Mutex::new(ConsoleState::default()),
        }
    }

    /// Print the next task list that arrives.
    pub fn request_list(&self) {
        self.list_requested.store(true, Ordering::SeqCst);
    }

    /// Up to `lines` most recent log lines, for one task or for everything.
    pub fn history(&self, task_id: Option<&str>, lines: usize) -> Vec<String> {
        let state = self.inner.lock();
        let source = match task_id {
            Some(id) => match state.per_task.get(id) {
                Some(log) => log,
                None => return Vec::new(),
            },
            None => &state.recent,
        };
        let skip = source.len().saturating_sub(lines);
        source.iter().skip(skip).cloned().collect()
    }

    /// Full id for an exact id or a unique prefix of one.
    pub fn resolve(&self, prefix: &str) -> Result<String, AppError> {
        let state = self.inner.lock();
        if let Some(task) = state.tasks.iter().find(|t| t.id == prefix) {
            return Ok(task.id.clone());
        }
        let mut matches = state.tasks.iter().filter(|t| t.id.starts_with(prefix));
        match (matches.next(), matches.next()) {
            (Some(task), None) if !prefix.is_empty() => Ok(task.id.clone()),
            (Some(_), Some(_)) => Err(AppError::TaskNotFound(format!("{prefix} (ambiguous prefix)"))),
            _ => Err(AppError::TaskNotFound(prefix.to_string())),
        }
    }

    fn record(&self, task_id: &str, message: &str) {
        let line = format!("[{}] {message}", Local::now().format("%H:%M:%S"));
        let mut state = self.inner.lock();
        if task_id != SYSTEM {
            let log = state.per_task.entry(task_id.to_string()).or_default();
            log.push_back(line.clone());
            while log.len() > self.per_task_limit {
                log.pop_front();
            }
        }
        state.recent.push_back(format!("{}: {}", short_id(task_id), line));
        while state.recent.len() > GLOBAL_HISTORY {
            state.recent.pop_front();
        }
    }

    fn print(&self, notification: &Notification) {
        if self.json {
            match serde_json::to_string(notification) {
                Ok(line) => println!("{line}"),
                Err(e) => eprintln!("failed to encode notification: {e}"),
            }
            return;
        }

        match notification {
            Notification::Log {
                task_id,
                message,
                level,
            } => {
                let marker = if *level == LogLevel::Error { "!" } else { " " };
                println!("{marker}[{}] {message}", short_id(task_id));
            }
            Notification::TaskStatus { task_id, status } => {
                println!(" [{}] status: {}", short_id(task_id), status.label());
            }
            Notification::TaskInfo { task_id, info } => {
                let pid = info.pid.map_or_else(|| "?".to_string(), |p| p.to_string());
                println!(" [{}] serving {} (pid {pid})", short_id(task_id), info.url);
            }
            Notification::TaskList(tasks) => {
                if self.list_requested.swap(false, Ordering::SeqCst) {
                    print_table(tasks);
                }
            }
        }
    }
}

impl NotificationSink for ConsoleSink {
    fn notify(&self, notification: Notification) {
        match &notification {
            Notification::Log {
                task_id, message, ..
            } => self.record(task_id, message),
            Notification::TaskList(tasks) => {
                let mut state = self.inner.lock();
                state.per_task.retain(|id, _| tasks.iter().any(|t| &t.id == id));
                state.tasks = tasks.clone();
            }
            _ => {}
        }
        self.print(&notification);
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

fn print_table(tasks: &[TaskView]) {
    if tasks.is_empty() {
        println!("no tasks yet, use `create` to add one");
        return;
    }
    println!("{:<10} {:<20} {:<16} {}", "ID", "NAME", "STATUS", "URL");
    println!("{}", "-".repeat(70));
    for task in tasks {
        println!(
            "{:<10} {:<20} {:<16} {}",
            short_id(&task.id),
            task.name,
            task.status.label(),
            task.url
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::{TaskConfig, TaskStatus};

    fn view(id: &str) -> TaskView {
        TaskView {
            id: id.into(),
            name: id.into(),
            status: TaskStatus::Stopped,
            config: TaskConfig::default(),
            url: String::new(),
        }
    }

    fn log(sink: &ConsoleSink, id: &str, message: &str) {
        sink.notify(Notification::Log {
            task_id: id.into(),
            message: message.into(),
            level: LogLevel::Info,
        });
    }

    /// History lines without their `[HH:MM:SS] ` stamp.
    fn messages(lines: Vec<String>) -> Vec<String> {
        lines
            .into_iter()
            .map(|line| match line.split_once("] ") {
                Some((head, rest)) => format!("{}{rest}", head.split('[').next().unwrap_or("")),
                None => line,
            })
            .collect()
    }

    #[test]
    fn per_task_history_is_bounded() {
        let sink = ConsoleSink::new(true, 3);
        for i in 0..5 {
            log(&sink, "task-a", &format!("line {i}"));
        }
        log(&sink, SYSTEM, "batch");
        assert_eq!(messages(sink.history(Some("task-a"), 10)), vec!["line 2", "line 3", "line 4"]);
        assert_eq!(messages(sink.history(Some("task-a"), 1)), vec!["line 4"]);
        assert!(sink.history(Some(SYSTEM), 10).is_empty());
        assert_eq!(messages(sink.history(None, 2)), vec!["task-a: line 4", "system: batch"]);
    }

    #[test]
    fn history_lines_are_stamped() {
        let sink = ConsoleSink::new(true, 3);
        log(&sink, "task-a", "task started");
        let line = &sink.history(Some("task-a"), 1)[0];
        // [HH:MM:SS] task started
        assert_eq!(line.len(), "[00:00:00] task started".len());
        assert!(line.starts_with('['));
        assert_eq!(&line[9..], "] task started");
    }

    #[test]
    fn task_list_prunes_removed_task_history() {
        let sink = ConsoleSink::new(true, 10);
        log(&sink, "keep", "a");
        log(&sink, "gone", "b");
        sink.notify(Notification::TaskList(vec![view("keep")]));
        assert_eq!(sink.history(Some("keep"), 10).len(), 1);
        assert!(sink.history(Some("gone"), 10).is_empty());
        assert_eq!(sink.history(None, 10).len(), 2);
    }

    #[test]
    fn resolves_unique_prefixes() {
        let sink = ConsoleSink::new(true, 10);
        sink.notify(Notification::TaskList(vec![
            view("abc123"),
            view("abd456"),
            view("abc"),
        ]));
        assert_eq!(sink.resolve("abd").unwrap(), "abd456");
        assert_eq!(sink.resolve("abc").unwrap(), "abc");
        assert!(matches!(sink.resolve("ab"), Err(AppError::TaskNotFound(_))));
        assert!(matches!(sink.resolve("zz"), Err(AppError::TaskNotFound(_))));
        assert!(sink.resolve("").is_err());
    }

    #[test]
    fn short_ids() {
        assert_eq!(short_id("0123456789"), "01234567");
        assert_eq!(short_id("system"), "system");
    }
}
