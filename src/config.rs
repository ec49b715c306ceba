use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppError;

const APP_DIR: &str = "proxy-panel";

#[cfg(windows)]
const DEFAULT_BINARY: &str = "gost.exe";
#[cfg(not(windows))]
const DEFAULT_BINARY: &str = "gost";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// The gost executable every task runs.
    pub proxy_binary: PathBuf,
    pub tasks_file: PathBuf,
    /// Lines of output kept per task for the console's `logs` command.
    pub log_history: usize,
    pub shutdown_grace_ms: u64,
    /// Start every stored task at launch.
    pub autostart: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            proxy_binary: default_binary(),
            tasks_file: default_tasks_file(),
            log_history: 500,
            shutdown_grace_ms: 3000,
            autostart: false,
        }
    }
}

impl AppConfig {
    /// Reads `path`, or the default location when `None`. Only an explicit
    /// path has to exist.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let raw = fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        let config = Self::parse(&raw)
            .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?;
        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join("config.toml"))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// gost next to our own executable if it is there, otherwise whatever PATH finds.
fn default_binary() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_BINARY)))
        .filter(|candidate| candidate.is_file())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BINARY))
}

fn default_tasks_file() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasks.json")
}
