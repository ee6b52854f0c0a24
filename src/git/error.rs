//! Error taxonomy for the Git Operations Gateway.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Errors surfaced by [`crate::git::executor::CommandExecutor`] and the Gateway
/// operations built on top of it.
#[derive(Debug, Clone)]
pub enum GitError {
    /// A `git` invocation exited non-zero. Carries the full argv (for
    /// reproducing the failure) and the combined stderr/stdout.
    CommandFailed {
        argv: Vec<String>,
        exit_code: Option<i32>,
        output: String,
    },
    /// Gateway output could not be parsed into the expected shape.
    ParseError(String),
    /// A network-touching operation (fetch/push/ls-remote) exceeded its
    /// deadline.
    NetworkTimeout { argv: Vec<String>, timeout: Duration },
    /// A merge produced conflicts. Never swallowed by callers.
    MergeConflict {
        operation: String,
        worktree_name: String,
        worktree_path: PathBuf,
        conflict_files: Vec<String>,
        message: String,
    },
    /// An operation was refused because the required precondition did not
    /// hold (e.g. pushing workflow-file changes without workflow authority).
    PreconditionFailed { reason: String },
    /// The working tree has no symbolic HEAD (detached), but the caller
    /// requested a branch name.
    DetachedHead,
    /// The path given is not inside a Git working tree.
    NotAGitRepository { path: PathBuf },
}

impl GitError {
    pub fn command_failed(argv: &[&str], exit_code: Option<i32>, output: impl Into<String>) -> Self {
        GitError::CommandFailed {
            argv: argv.iter().map(|s| s.to_string()).collect(),
            exit_code,
            output: output.into(),
        }
    }
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GitError::CommandFailed {
                argv,
                exit_code,
                output,
            } => {
                write!(
                    f,
                    "git {} failed (exit {:?}): {}",
                    argv.join(" "),
                    exit_code,
                    output.trim()
                )
            }
            GitError::ParseError(msg) => write!(f, "failed to parse git output: {msg}"),
            GitError::NetworkTimeout { argv, timeout } => {
                write!(f, "git {} timed out after {:?}", argv.join(" "), timeout)
            }
            GitError::MergeConflict {
                operation,
                worktree_name,
                conflict_files,
                message,
                ..
            } => {
                write!(
                    f,
                    "{operation} in {worktree_name} produced conflicts in {}: {message}",
                    conflict_files.join(", ")
                )
            }
            GitError::PreconditionFailed { reason } => write!(f, "precondition failed: {reason}"),
            GitError::DetachedHead => write!(f, "HEAD is detached; no branch name available"),
            GitError::NotAGitRepository { path } => {
                write!(f, "{} is not inside a git working tree", path.display())
            }
        }
    }
}

impl std::error::Error for GitError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_includes_argv_and_output() {
        let err = GitError::command_failed(&["status", "--porcelain"], Some(1), "fatal: bad");
        let msg = err.to_string();
        assert!(msg.contains("status --porcelain"));
        assert!(msg.contains("fatal: bad"));
    }

    #[test]
    fn merge_conflict_display_lists_files() {
        let err = GitError::MergeConflict {
            operation: "merge".into(),
            worktree_name: "felix".into(),
            worktree_path: PathBuf::from("/ws/widgets/felix"),
            conflict_files: vec!["conflict.txt".into()],
            message: "manual resolution required".into(),
        };
        assert!(err.to_string().contains("conflict.txt"));
    }

    #[test]
    fn detached_head_display() {
        assert_eq!(
            GitError::DetachedHead.to_string(),
            "HEAD is detached; no branch name available"
        );
    }
}
