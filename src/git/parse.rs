//! Parsing for `git worktree list --porcelain` and default-branch discovery.

use std::path::{Path, PathBuf};

use super::{GitError, WorktreeEntry, finalize_worktree};

/// Resolve the git directory for a worktree by reading its `.git` file
/// (`gitdir: <path>`), falling back to `<path>/.git` itself for the main
/// worktree, where `.git` is a real directory rather than a file.
fn worktree_git_dir(path: &Path) -> PathBuf {
    let dot_git = path.join(".git");
    if dot_git.is_dir() {
        return dot_git;
    }
    std::fs::read_to_string(&dot_git)
        .ok()
        .and_then(|content| {
            content
                .trim()
                .strip_prefix("gitdir: ")
                .map(|rest| path.join(rest))
        })
        .unwrap_or(dot_git)
}

pub(crate) fn parse_porcelain_list(output: &str) -> Result<Vec<WorktreeEntry>, GitError> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeEntry> = None;

    for line in output.lines() {
        if line.is_empty() {
            if let Some(wt) = current.take() {
                let git_dir = worktree_git_dir(&wt.path);
                worktrees.push(finalize_worktree(wt, &git_dir));
            }
            continue;
        }

        let (key, value) = match line.split_once(' ') {
            Some((k, v)) => (k, Some(v)),
            None => (line, None),
        };

        match key {
            "worktree" => {
                let path = value
                    .ok_or_else(|| GitError::ParseError("worktree line missing path".to_string()))?;
                current = Some(WorktreeEntry {
                    path: PathBuf::from(path),
                    head: String::new(),
                    branch: None,
                    bare: false,
                    detached: false,
                    locked: None,
                    prunable: None,
                });
            }
            key => match (key, current.as_mut()) {
                ("HEAD", Some(wt)) => {
                    wt.head = value
                        .ok_or_else(|| GitError::ParseError("HEAD line missing SHA".to_string()))?
                        .to_string();
                }
                ("branch", Some(wt)) => {
                    let branch_ref = value
                        .ok_or_else(|| GitError::ParseError("branch line missing ref".to_string()))?;
                    let branch = branch_ref
                        .strip_prefix("refs/heads/")
                        .unwrap_or(branch_ref)
                        .to_string();
                    wt.branch = Some(branch);
                }
                ("bare", Some(wt)) => wt.bare = true,
                ("detached", Some(wt)) => wt.detached = true,
                ("locked", Some(wt)) => wt.locked = Some(value.unwrap_or_default().to_string()),
                ("prunable", Some(wt)) => wt.prunable = Some(value.unwrap_or_default().to_string()),
                _ => {}
            },
        }
    }

    if let Some(wt) = current {
        let git_dir = worktree_git_dir(&wt.path);
        worktrees.push(finalize_worktree(wt, &git_dir));
    }

    Ok(worktrees)
}

/// The repository's default branch, as resolved from either a local
/// remote-tracking `HEAD` ref or a remote `ls-remote --symref` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultBranchName(String);

impl DefaultBranchName {
    pub(crate) fn from_local(remote: &str, output: &str) -> Result<Self, GitError> {
        let trimmed = output.trim();
        let prefix = format!("{remote}/");
        let branch = trimmed.strip_prefix(&prefix).unwrap_or(trimmed);

        if branch.is_empty() {
            return Err(GitError::ParseError(format!(
                "empty branch name from {remote}/HEAD"
            )));
        }

        Ok(Self(branch.to_string()))
    }

    pub(crate) fn from_remote(output: &str) -> Result<Self, GitError> {
        output
            .lines()
            .find_map(|line| {
                line.strip_prefix("ref: ")
                    .and_then(|symref| symref.split_once('\t'))
                    .map(|(ref_path, _)| ref_path)
                    .and_then(|ref_path| ref_path.strip_prefix("refs/heads/"))
                    .map(str::to_string)
            })
            .map(Self)
            .ok_or_else(|| GitError::ParseError("no symbolic ref in ls-remote output".to_string()))
    }

    pub(crate) fn into_string(self) -> String {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_worktree() {
        let output = "worktree /ws/widgets/felix\nHEAD abc123\nbranch refs/heads/felix\n\n";
        let entries = parse_porcelain_list(output).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].branch.as_deref(), Some("felix"));
        assert_eq!(entries[0].head, "abc123");
    }

    #[test]
    fn parses_bare_and_detached_entries() {
        let output = "worktree /ws/repos/acme_widgets.git\nbare\n\nworktree /ws/widgets/felix\nHEAD abc123\ndetached\n\n";
        let entries = parse_porcelain_list(output).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].bare);
        assert!(entries[1].detached);
        assert!(entries[1].branch.is_none());
    }

    #[test]
    fn default_branch_from_local_strips_remote_prefix() {
        let name = DefaultBranchName::from_local("origin", "origin/main\n").unwrap();
        assert_eq!(name.into_string(), "main");
    }

    #[test]
    fn default_branch_from_local_rejects_empty() {
        assert!(DefaultBranchName::from_local("origin", "origin/\n").is_err());
    }

    #[test]
    fn default_branch_from_remote_parses_symref() {
        let output = "ref: refs/heads/master\tHEAD\nabc123\tHEAD\n";
        let name = DefaultBranchName::from_remote(output).unwrap();
        assert_eq!(name.into_string(), "master");
    }

    #[test]
    fn default_branch_from_remote_errors_without_symref() {
        assert!(DefaultBranchName::from_remote("abc123\tHEAD\n").is_err());
    }
}
