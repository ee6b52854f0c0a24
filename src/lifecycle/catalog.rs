//! The in-memory repositories/worktrees catalog and its locking discipline.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::utils::get_now;

/// A checked-out repository: a bare clone plus metadata shared by every
/// worktree that forks from it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Repository {
    /// `<owner>/<name>` for a remote GitHub repo, `local/<basename>` for a
    /// local-only clone.
    pub id: String,
    #[serde(rename = "url")]
    pub remote_url: Option<String>,
    #[serde(rename = "path")]
    pub bare_path: PathBuf,
    pub default_branch: String,
    pub created_at: u64,
    pub last_accessed: u64,
}

impl Repository {
    pub fn new(id: impl Into<String>, bare_path: PathBuf, default_branch: impl Into<String>) -> Self {
        let now = get_now();
        Self {
            id: id.into(),
            remote_url: None,
            bare_path,
            default_branch: default_branch.into(),
            created_at: now,
            last_accessed: now,
        }
    }
}

/// A single live worktree: a working-directory view of a repository bound
/// to a ref.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Worktree {
    pub id: Uuid,
    pub repo_id: String,
    /// `"<repo>/<workspace>"`.
    #[serde(rename = "name")]
    pub display_name: String,
    pub path: PathBuf,
    /// The ref HEAD currently resolves to: `refs/heads/<x>`, a custom
    /// namespace ref, or a detached hash.
    pub branch: String,
    /// The branch this worktree forked from.
    pub source_branch: String,
    pub commit_hash: String,
    #[serde(rename = "commit_count")]
    pub commits_ahead: usize,
    pub commits_behind: usize,
    pub is_dirty: bool,
    pub has_conflicts: bool,
    pub has_been_renamed: bool,
    pub created_at: u64,
    pub last_accessed: u64,
}

impl Worktree {
    /// Whether this worktree is eligible for `CleanupMerged`'s deletion
    /// sweep: clean, conflict-free, fully landed, and never manually
    /// renamed (a rename vetoes automatic cleanup so a human-chosen display
    /// name is never silently deleted out from under them).
    pub fn is_cleanup_eligible(&self) -> bool {
        !self.is_dirty && !self.has_conflicts && self.commits_ahead == 0 && !self.has_been_renamed
    }
}

/// Snapshot of the catalog taken under the reader lock, released before any
/// Gateway call per the Lifecycle Manager's locking discipline: callers
/// mutate `Repository`/`Worktree` copies off-lock, then feed the result back
/// through [`Catalog::commit_worktree`] / [`Catalog::commit_repository`].
#[derive(Debug, Default)]
pub struct Catalog {
    repositories: RwLock<HashMap<String, Repository>>,
    worktrees: RwLock<HashMap<Uuid, Worktree>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(repositories: HashMap<String, Repository>, worktrees: HashMap<Uuid, Worktree>) -> Self {
        Self {
            repositories: RwLock::new(repositories),
            worktrees: RwLock::new(worktrees),
        }
    }

    pub fn repository(&self, id: &str) -> Option<Repository> {
        self.repositories.read().unwrap().get(id).cloned()
    }

    pub fn worktree(&self, id: Uuid) -> Option<Worktree> {
        self.worktrees.read().unwrap().get(&id).cloned()
    }

    pub fn list_repositories(&self) -> Vec<Repository> {
        self.repositories.read().unwrap().values().cloned().collect()
    }

    pub fn list_worktrees(&self) -> Vec<Worktree> {
        self.worktrees.read().unwrap().values().cloned().collect()
    }

    pub fn worktrees_for_repo(&self, repo_id: &str) -> Vec<Worktree> {
        self.worktrees
            .read()
            .unwrap()
            .values()
            .filter(|w| w.repo_id == repo_id)
            .cloned()
            .collect()
    }

    /// I4: whether `branch` is already used by another worktree of the same
    /// repository.
    pub fn branch_in_use(&self, repo_id: &str, branch: &str) -> bool {
        self.worktrees
            .read()
            .unwrap()
            .values()
            .any(|w| w.repo_id == repo_id && w.branch == branch)
    }

    pub fn commit_repository(&self, repo: Repository) {
        self.repositories.write().unwrap().insert(repo.id.clone(), repo);
    }

    pub fn commit_worktree(&self, worktree: Worktree) {
        self.worktrees.write().unwrap().insert(worktree.id, worktree);
    }

    pub fn remove_worktree(&self, id: Uuid) -> Option<Worktree> {
        self.worktrees.write().unwrap().remove(&id)
    }

    pub fn remove_repository(&self, id: &str) -> Option<Repository> {
        self.repositories.write().unwrap().remove(id)
    }

    pub fn snapshot(&self) -> (HashMap<String, Repository>, HashMap<Uuid, Worktree>) {
        (
            self.repositories.read().unwrap().clone(),
            self.worktrees.read().unwrap().clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_worktree(repo_id: &str, branch: &str) -> Worktree {
        let now = get_now();
        Worktree {
            id: Uuid::new_v4(),
            repo_id: repo_id.to_string(),
            display_name: "widgets/felix".to_string(),
            path: PathBuf::from("/ws/widgets/felix"),
            branch: branch.to_string(),
            source_branch: "main".to_string(),
            commit_hash: "abc123".to_string(),
            commits_ahead: 0,
            commits_behind: 0,
            is_dirty: false,
            has_conflicts: false,
            has_been_renamed: false,
            created_at: now,
            last_accessed: now,
        }
    }

    #[test]
    fn branch_in_use_detects_collision_within_repo_only() {
        let catalog = Catalog::new();
        catalog.commit_worktree(sample_worktree("acme/widgets", "refs/catnip/felix"));
        assert!(catalog.branch_in_use("acme/widgets", "refs/catnip/felix"));
        assert!(!catalog.branch_in_use("acme/other", "refs/catnip/felix"));
    }

    #[test]
    fn cleanup_eligible_requires_clean_unconflicted_landed_unrenamed() {
        let mut wt = sample_worktree("acme/widgets", "refs/catnip/felix");
        assert!(wt.is_cleanup_eligible());

        wt.is_dirty = true;
        assert!(!wt.is_cleanup_eligible());
        wt.is_dirty = false;

        wt.has_conflicts = true;
        assert!(!wt.is_cleanup_eligible());
        wt.has_conflicts = false;

        wt.commits_ahead = 1;
        assert!(!wt.is_cleanup_eligible());
        wt.commits_ahead = 0;

        wt.has_been_renamed = true;
        assert!(!wt.is_cleanup_eligible());
    }

    #[test]
    fn commit_and_remove_round_trip() {
        let catalog = Catalog::new();
        let wt = sample_worktree("acme/widgets", "refs/catnip/felix");
        let id = wt.id;
        catalog.commit_worktree(wt.clone());
        assert_eq!(catalog.worktree(id), Some(wt));
        assert_eq!(catalog.remove_worktree(id).map(|w| w.id), Some(id));
        assert_eq!(catalog.worktree(id), None);
    }

    #[test]
    fn snapshot_reflects_committed_state() {
        let catalog = Catalog::new();
        let repo = Repository::new("acme/widgets", PathBuf::from("/ws/repos/acme_widgets.git"), "main");
        catalog.commit_repository(repo.clone());
        let (repos, worktrees) = catalog.snapshot();
        assert_eq!(repos.get("acme/widgets"), Some(&repo));
        assert!(worktrees.is_empty());
    }
}
