use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid task config: {0}")]
    InvalidConfig(String),

    #[error("failed to start proxy process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("task store {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("task store is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),
}

impl AppError {
    pub(crate) fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Persist {
            path: path.into(),
            source,
        }
    }
}
