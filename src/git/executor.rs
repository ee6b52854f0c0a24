//! Back-end polymorphism for the Git Operations Gateway.
//!
//! `CommandExecutor` is the single capability set every Gateway operation is
//! built on. Concrete variants: [`ShellExecutor`] spawns the real `git`
//! binary; [`InMemoryExecutor`] is a deterministic test double. Callers never
//! see which variant they hold — the Gateway takes `Arc<dyn CommandExecutor>`
//! and treats both identically.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::time::Duration;

use dashmap::DashMap;
use wait_timeout::ChildExt;

use super::error::GitError;

/// Result of running a command: exit code plus combined stdout/stderr,
/// normalized so callers never have to special-case `\r\n`.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// stdout and stderr concatenated, trimmed of trailing newlines.
    pub fn combined(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.trim_end().to_string()
        } else if self.stdout.is_empty() {
            self.stderr.trim_end().to_string()
        } else {
            format!("{}\n{}", self.stdout.trim_end(), self.stderr.trim_end())
        }
    }
}

/// The Gateway's back-end abstraction. All methods are blocking; long-running
/// network operations are expected to honor `timeout`.
pub trait CommandExecutor: Send + Sync {
    /// Run `git <args>` in `dir` with the process's inherited environment.
    fn execute(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError>;

    /// Run `git <args>` in `dir` with additional environment variables set.
    fn execute_with_env(
        &self,
        dir: &Path,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, GitError>;

    /// Run `git <args>` in `dir`, failing with [`GitError::NetworkTimeout`] if
    /// it does not complete within `timeout`. Used for network-touching
    /// operations (fetch, push, ls-remote).
    fn execute_with_timeout(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, GitError>;
}

/// Default timeout for network-touching Gateway operations when the caller
/// does not supply one.
pub const DEFAULT_NETWORK_TIMEOUT: Duration = Duration::from_secs(10);

/// Executor backed by spawning the real `git` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellExecutor;

impl ShellExecutor {
    pub fn new() -> Self {
        Self
    }

    fn run(
        &self,
        dir: &Path,
        args: &[&str],
        env: &[(&str, &str)],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, GitError> {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir).args(args);
        for (k, v) in env {
            cmd.env(k, v);
        }
        cmd.stdin(std::process::Stdio::null());
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| {
            GitError::command_failed(args, None, format!("failed to spawn git: {e}"))
        })?;

        // Drain stdout/stderr on background threads before waiting, so a
        // chatty command can't deadlock on a full pipe buffer while we're
        // blocked in `wait_timeout`.
        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();
        let stdout_handle = std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = Vec::new();
            if let Some(p) = stdout_pipe.as_mut() {
                let _ = p.read_to_end(&mut buf);
            }
            buf
        });
        let stderr_handle = std::thread::spawn(move || {
            use std::io::Read;
            let mut buf = Vec::new();
            if let Some(p) = stderr_pipe.as_mut() {
                let _ = p.read_to_end(&mut buf);
            }
            buf
        });

        let status = match timeout {
            None => child
                .wait()
                .map_err(|e| GitError::command_failed(args, None, e.to_string()))?,
            Some(d) => match child
                .wait_timeout(d)
                .map_err(|e| GitError::command_failed(args, None, e.to_string()))?
            {
                Some(status) => status,
                None => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(GitError::NetworkTimeout {
                        argv: args.iter().map(|s| s.to_string()).collect(),
                        timeout: d,
                    });
                }
            },
        };

        let stdout = stdout_handle.join().unwrap_or_default();
        let stderr = stderr_handle.join().unwrap_or_default();

        Ok(CommandOutput {
            success: status.success(),
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).replace("\r\n", "\n"),
            stderr: String::from_utf8_lossy(&stderr).replace("\r\n", "\n"),
        })
    }
}

impl CommandExecutor for ShellExecutor {
    fn execute(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        self.run(dir, args, &[], None)
    }

    fn execute_with_env(
        &self,
        dir: &Path,
        args: &[&str],
        env: &[(&str, &str)],
    ) -> Result<CommandOutput, GitError> {
        self.run(dir, args, env, None)
    }

    fn execute_with_timeout(
        &self,
        dir: &Path,
        args: &[&str],
        timeout: Duration,
    ) -> Result<CommandOutput, GitError> {
        self.run(dir, args, &[], Some(timeout))
    }
}

/// A single scripted response for the in-memory executor, keyed by the exact
/// argv it should match.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptedResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn err(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: Some(exit_code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Deterministic executor used by tests. Calls are recorded (for assertions)
/// and responses are looked up by `(dir, argv)`; unscripted calls default to
/// a successful empty response so tests only need to script the calls they
/// care about.
#[derive(Default)]
pub struct InMemoryExecutor {
    responses: DashMap<(PathBuf, Vec<String>), ScriptedResponse>,
    calls: Mutex<Vec<(PathBuf, Vec<String>)>>,
}

impl InMemoryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a response for an exact `(dir, argv)` match.
    pub fn script(&self, dir: impl Into<PathBuf>, args: &[&str], response: ScriptedResponse) {
        let key = (
            dir.into(),
            args.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        self.responses.insert(key, response);
    }

    /// All calls made so far, in order.
    pub fn calls(&self) -> Vec<(PathBuf, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    fn lookup(&self, dir: &Path, args: &[&str]) -> CommandOutput {
        let key = (
            dir.to_path_buf(),
            args.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
        );
        self.calls.lock().unwrap().push(key.clone());

        match self.responses.get(&key) {
            Some(r) => CommandOutput {
                success: r.success,
                exit_code: r.exit_code,
                stdout: r.stdout.clone(),
                stderr: r.stderr.clone(),
            },
            None => CommandOutput {
                success: true,
                exit_code: Some(0),
                stdout: String::new(),
                stderr: String::new(),
            },
        }
    }
}

impl CommandExecutor for InMemoryExecutor {
    fn execute(&self, dir: &Path, args: &[&str]) -> Result<CommandOutput, GitError> {
        Ok(self.lookup(dir, args))
    }

    fn execute_with_env(
        &self,
        dir: &Path,
        args: &[&str],
        _env: &[(&str, &str)],
    ) -> Result<CommandOutput, GitError> {
        Ok(self.lookup(dir, args))
    }

    fn execute_with_timeout(
        &self,
        dir: &Path,
        args: &[&str],
        _timeout: Duration,
    ) -> Result<CommandOutput, GitError> {
        Ok(self.lookup(dir, args))
    }
}

/// Helper used by Gateway operations: turn a non-successful [`CommandOutput`]
/// into a [`GitError::CommandFailed`].
pub fn require_success(args: &[&str], output: CommandOutput) -> Result<CommandOutput, GitError> {
    if output.success {
        Ok(output)
    } else {
        Err(GitError::command_failed(
            args,
            output.exit_code,
            output.combined(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn in_memory_executor_returns_scripted_response() {
        let exec = InMemoryExecutor::new();
        let dir = PathBuf::from("/repo");
        exec.script(dir.clone(), &["status", "--porcelain"], ScriptedResponse::ok("M file.txt\n"));

        let out = exec.execute(&dir, &["status", "--porcelain"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "M file.txt\n");
    }

    #[test]
    fn in_memory_executor_defaults_to_success() {
        let exec = InMemoryExecutor::new();
        let dir = PathBuf::from("/repo");
        let out = exec.execute(&dir, &["fetch"]).unwrap();
        assert!(out.success);
        assert_eq!(out.stdout, "");
    }

    #[test]
    fn in_memory_executor_records_calls() {
        let exec = InMemoryExecutor::new();
        let dir = PathBuf::from("/repo");
        let _ = exec.execute(&dir, &["status"]);
        let _ = exec.execute(&dir, &["fetch"]);
        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, vec!["status".to_string()]);
        assert_eq!(calls[1].1, vec!["fetch".to_string()]);
    }

    #[test]
    fn require_success_passes_through_ok_output() {
        let out = CommandOutput {
            success: true,
            exit_code: Some(0),
            stdout: "ok".into(),
            stderr: String::new(),
        };
        assert!(require_success(&["status"], out).is_ok());
    }

    #[test]
    fn require_success_errors_on_failure() {
        let out = CommandOutput {
            success: false,
            exit_code: Some(1),
            stdout: String::new(),
            stderr: "fatal: not a git repository".into(),
        };
        let err = require_success(&["status"], out).unwrap_err();
        assert!(err.to_string().contains("fatal"));
    }
}
