//! `ShellExecutor`: runs one command string through a shell and captures
//! its output, racing the child against an optional deadline.

use std::process::Stdio;

use tokio::process::Command as AsyncCommand;
use tracing::{debug, warn};

use crate::{
    error::{Result, ShellError},
    truncate,
    types::{ExecOptions, ExecResult},
};

/// Stateless launcher for `<shell> -c <command>`.
///
/// Cheap to clone; holds only the shell program name.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    /// Execute `command` and wait for it to exit.
    ///
    /// # Errors
    ///
    /// - `Spawn`: the shell could not be started.
    /// - `Timeout`: the child exceeded `options.timeout` and was killed.
    /// - `Io`: collecting output failed.
    pub async fn exec(&self, command: &str, options: &ExecOptions) -> Result<ExecResult> {
        debug!(shell = %self.shell, "exec: {command}");

        let mut cmd = AsyncCommand::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout also takes down whatever the shell forked.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd
            .spawn()
            .map_err(|e| ShellError::Spawn(format!("{}: {e}", self.shell)))?;

        // `wait_with_output` consumes the child, so it runs on its own task and
        // reports back over a oneshot. The PID is captured first so the timeout
        // path can still signal the process.
        let pid = child.id();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let _ = tx.send(child.wait_with_output().await);
        });

        let waited = match options.timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_elapsed) => {
                    kill_pid(pid);
                    return Err(ShellError::Timeout {
                        ms: limit.as_millis() as u64,
                    });
                }
            },
            None => rx.await,
        };

        match waited {
            Ok(Ok(output)) => {
                let exit_code = output.status.code().unwrap_or(-1);
                Ok(ExecResult {
                    exit_code,
                    stdout: clean(&output.stdout, options.max_output_chars),
                    stderr: clean(&output.stderr, options.max_output_chars),
                })
            }
            Ok(Err(e)) => Err(ShellError::Io(e)),
            // The wait task dropped its sender without sending: it panicked.
            Err(_recv) => Err(ShellError::Spawn("wait task ended unexpectedly".to_string())),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

/// SIGKILL the child's process group; we no longer hold the child handle.
fn kill_pid(pid: Option<u32>) {
    let Some(raw_pid) = pid else { return };
    warn!(pid = raw_pid, "killing child after timeout");
    #[cfg(unix)]
    // Safety: raw_pid leads the process group created at spawn; kill(2) on a
    // group that already exited only returns ESRCH.
    unsafe {
        libc::kill(-(raw_pid as libc::pid_t), libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = std::process::Command::new("taskkill")
            .args(["/F", "/PID", &raw_pid.to_string()])
            .output();
    }
}

/// Strip ANSI escape codes, decode lossily, and truncate.
fn clean(raw: &[u8], max_chars: usize) -> String {
    let stripped = strip_ansi_escapes::strip(raw);
    truncate::truncate_output(&String::from_utf8_lossy(&stripped), max_chars)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let sh = ShellExecutor::default();
        let res = sh
            .exec("printf hello; printf oops >&2; exit 3", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(res.exit_code, 3);
        assert_eq!(res.stdout, "hello");
        assert_eq!(res.stderr, "oops");
        assert!(!res.success());
    }

    #[tokio::test]
    async fn strips_ansi_sequences() {
        let sh = ShellExecutor::default();
        let res = sh
            .exec(r"printf '\033[31mred\033[0m'", &ExecOptions::default())
            .await
            .unwrap();
        assert_eq!(res.stdout, "red");
        assert!(res.success());
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let sh = ShellExecutor::default();
        let opts = ExecOptions::default().with_timeout(Some(Duration::from_millis(200)));
        let started = Instant::now();
        let err = sh.exec("sleep 5", &opts).await.unwrap_err();
        assert!(matches!(err, ShellError::Timeout { ms: 200 }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_error() {
        let sh = ShellExecutor::new("/nonexistent/taskops-shell");
        let err = sh.exec("true", &ExecOptions::default()).await.unwrap_err();
        assert!(matches!(err, ShellError::Spawn(_)));
    }

    #[tokio::test]
    async fn output_is_truncated() {
        let sh = ShellExecutor::default();
        let opts = ExecOptions {
            timeout: None,
            max_output_chars: 10,
        };
        let res = sh.exec("printf '%0100d' 0", &opts).await.unwrap();
        assert!(res.stdout.contains("chars omitted"));
    }
}
