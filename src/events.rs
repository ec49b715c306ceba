//! Push notifications from the supervisor to whatever is showing the tasks.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::tasks::types::{TaskStatus, TaskView};

/// Log channel used for batch operations and store failures.
pub const SYSTEM: &str = "system";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum Notification {
    #[serde(rename_all = "camelCase")]
    Log {
        task_id: String,
        message: String,
        level: LogLevel,
    },
    #[serde(rename_all = "camelCase")]
    TaskStatus { task_id: String, status: TaskStatus },
    #[serde(rename_all = "camelCase")]
    TaskInfo { task_id: String, info: ProcessInfo },
    TaskList(Vec<TaskView>),
}

/// Where a freshly started task listens, and its process id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub url: String,
    pub pid: Option<u32>,
}

/// Receives notifications. Implementations must not call back into the
/// supervisor.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forwards notifications over a channel, for front-ends living on another task.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // A closed receiver just means nobody is watching anymore.
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::types::TaskConfig;

    #[test]
    fn serializes_with_channel_names() {
        let log = Notification::Log {
            task_id: "abc".into(),
            message: "task started".into(),
            level: LogLevel::Info,
        };
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["event"], "log");
        assert_eq!(json["payload"]["taskId"], "abc");
        assert_eq!(json["payload"]["level"], "info");

        let status = Notification::TaskStatus {
            task_id: "abc".into(),
            status: TaskStatus::FailedToStart,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["event"], "task-status");
        assert_eq!(json["payload"]["status"], "failed_to_start");

        let info = Notification::TaskInfo {
            task_id: "abc".into(),
            info: ProcessInfo {
                url: "socks5://localhost:1080".into(),
                pid: Some(42),
            },
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["event"], "task-info");
        assert_eq!(json["payload"]["taskId"], "abc");
        assert_eq!(json["payload"]["info"]["url"], "socks5://localhost:1080");
        assert_eq!(json["payload"]["info"]["pid"], 42);
    }

    #[test]
    fn task_list_payload_is_array_of_views() {
        let list = Notification::TaskList(vec![TaskView {
            id: "abc".into(),
            name: "office".into(),
            status: TaskStatus::Running,
            config: TaskConfig::default(),
            url: "http://localhost:8080".into(),
        }]);
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["event"], "task-list");
        assert_eq!(json["payload"][0]["config"]["localProto"], "http");
        assert!(json["payload"][0].get("process").is_none());
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(Notification::TaskList(vec![]));
        sink.notify(Notification::TaskStatus {
            task_id: "x".into(),
            status: TaskStatus::Stopped,
        });
        assert_eq!(rx.recv().await, Some(Notification::TaskList(vec![])));
        assert!(matches!(
            rx.recv().await,
            Some(Notification::TaskStatus { ref task_id, .. }) if task_id == "x"
        ));
    }
}
