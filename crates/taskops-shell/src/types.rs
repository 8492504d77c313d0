//! Shared data types for taskops-shell.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecResult {
    /// Process exit code (0 = success). `-1` when the child was terminated by
    /// a signal and has no code.
    pub exit_code: i32,

    /// Captured standard output (ANSI escapes stripped, truncated).
    pub stdout: String,

    /// Captured standard error (ANSI escapes stripped, truncated).
    pub stderr: String,
}

impl ExecResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Per-invocation knobs.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Kill the child if it runs longer than this. `None` waits forever.
    pub timeout: Option<Duration>,

    /// Maximum characters kept per stream; see [`crate::truncate`].
    pub max_output_chars: usize,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            max_output_chars: crate::truncate::DEFAULT_MAX_CHARS,
        }
    }
}

impl ExecOptions {
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}
