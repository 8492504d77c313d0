use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskopsError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid interval: {input:?} (expected <positive integer><m|h|d|y>)")]
    InvalidInterval { input: String },

    #[error("Invalid task definition ({task}): {reason}")]
    ConfigValidation { task: String, reason: String },

    #[error("YAML error in {file}: {reason}")]
    Yaml { file: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TaskopsError {
    /// Short error code string, stable across releases (used by `taskops validate`).
    pub fn code(&self) -> &'static str {
        match self {
            TaskopsError::Config(_) => "CONFIG_ERROR",
            TaskopsError::InvalidInterval { .. } => "INVALID_INTERVAL",
            TaskopsError::ConfigValidation { .. } => "CONFIG_VALIDATION",
            TaskopsError::Yaml { .. } => "YAML_ERROR",
            TaskopsError::Io(_) => "IO_ERROR",
        }
    }

    pub(crate) fn validation(task: &str, reason: impl Into<String>) -> Self {
        TaskopsError::ConfigValidation {
            task: task.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TaskopsError>;
