use serde::{Deserialize, Deserializer, Serialize};

use crate::process::types::ProcessHandle;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Proxy,
    Portmap,
}

/// User-supplied task settings. Field names follow the panel's form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub mode: Mode,
    pub local_proto: String,
    #[serde(deserialize_with = "port::required")]
    pub local_port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_proto: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "port::optional"
    )]
    pub remote_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_addr: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        deserialize_with = "port::optional"
    )]
    pub target_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<String>,
    pub debug: bool,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            name: None,
            mode: Mode::Proxy,
            local_proto: "http".into(),
            local_port: 8080,
            remote_proto: None,
            remote_addr: None,
            remote_port: None,
            target_addr: None,
            target_port: None,
            interface: None,
            debug: false,
        }
    }
}

/// Ports arrive as numbers, numeric strings or `""` for a blank field.
mod port {
    use serde::de::Error;

    use super::*;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u16),
        Text(String),
    }

    pub fn optional<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u16>, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(None),
            Some(Raw::Number(port)) => Ok(Some(port)),
            Some(Raw::Text(text)) => match text.trim() {
                "" => Ok(None),
                text => text
                    .parse()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid port {text:?}"))),
            },
        }
    }

    /// A blank local port becomes 0, which the launcher rejects.
    pub fn required<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        optional(deserializer).map(|port| port.unwrap_or(0))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Stopped,
    Running,
    FailedToStart,
}

impl TaskStatus {
    pub fn label(self) -> &'static str {
        match self {
            TaskStatus::Stopped => "stopped",
            TaskStatus::Running => "running",
            TaskStatus::FailedToStart => "failed to start",
        }
    }
}

pub struct Task {
    pub id: String,
    pub name: String,
    pub config: TaskConfig,
    pub status: TaskStatus,
    pub url: String,
    pub process: Option<ProcessHandle>,
}

impl Task {
    pub fn new(id: String, config: TaskConfig) -> Self {
        let name = config
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Task {}", id.chars().take(6).collect::<String>()));
        Self {
            id,
            name,
            config,
            status: TaskStatus::Stopped,
            url: String::new(),
            process: None,
        }
    }

    /// A process is attached and no termination has been requested for it.
    pub fn is_live(&self) -> bool {
        self.process
            .as_ref()
            .is_some_and(|process| !process.is_terminating())
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            name: self.name.clone(),
            status: self.status,
            config: self.config.clone(),
            url: self.url.clone(),
        }
    }

    pub fn stored(&self) -> StoredTask {
        StoredTask {
            id: self.id.clone(),
            name: self.name.clone(),
            config: self.config.clone(),
            status: self.status,
        }
    }
}

/// What the UI gets to see of a task. Never carries the process handle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub status: TaskStatus,
    pub config: TaskConfig,
    pub url: String,
}

/// One record of the persisted task file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredTask {
    pub id: String,
    pub name: String,
    pub config: TaskConfig,
    pub status: TaskStatus,
}

impl From<StoredTask> for Task {
    fn from(stored: StoredTask) -> Self {
        // Nothing survives a restart, whatever the file says.
        Self {
            id: stored.id,
            name: stored.name,
            config: stored.config,
            status: TaskStatus::Stopped,
            url: String::new(),
            process: None,
        }
    }
}
