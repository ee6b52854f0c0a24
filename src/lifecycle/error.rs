//! Error taxonomy for the Worktree Lifecycle Manager.

use std::fmt;

/// Errors surfaced by [`super::manager::LifecycleManager`] operations.
#[derive(Debug)]
pub enum LifecycleError {
    /// No repository or worktree exists with the given id.
    NotFound { kind: &'static str, id: String },
    /// The requested branch name is already used by another worktree of the
    /// same repository (I4).
    BranchInUse { branch: String },
    /// Cloning the repository failed.
    CloneFailed { url: String, reason: String },
    /// The supplied remote URL could not be parsed.
    InvalidUrl { url: String },
    /// The persisted catalog snapshot could not be parsed.
    StateCorruption { reason: String },
    /// A Git operation underlying this Lifecycle operation failed.
    Git(crate::git::GitError),
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleError::NotFound { kind, id } => write!(f, "{kind} not found: {id}"),
            LifecycleError::BranchInUse { branch } => write!(f, "branch already in use: {branch}"),
            LifecycleError::CloneFailed { url, reason } => {
                write!(f, "failed to clone {url}: {reason}")
            }
            LifecycleError::InvalidUrl { url } => write!(f, "invalid repository url: {url}"),
            LifecycleError::StateCorruption { reason } => {
                write!(f, "catalog state is corrupt: {reason}")
            }
            LifecycleError::Git(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<crate::git::GitError> for LifecycleError {
    fn from(e: crate::git::GitError) -> Self {
        LifecycleError::Git(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = LifecycleError::NotFound {
            kind: "worktree",
            id: "abc".into(),
        };
        assert_eq!(err.to_string(), "worktree not found: abc");
    }

    #[test]
    fn git_error_wraps_through() {
        let git_err = crate::git::GitError::DetachedHead;
        let err: LifecycleError = git_err.into();
        assert!(err.to_string().contains("detached"));
    }
}
