//! Error types for the taskops-shell crate.

use thiserror::Error;

/// Ways a shell invocation can fail before producing an exit status.
///
/// A non-zero exit is not an error here; it is reported in
/// [`ExecResult::exit_code`](crate::types::ExecResult).
#[derive(Debug, Error)]
pub enum ShellError {
    /// The shell process could not be started.
    #[error("spawn failed: {0}")]
    Spawn(String),

    /// Reading the child's output or waiting on it failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The child outlived its time budget and was killed.
    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ShellError>;
