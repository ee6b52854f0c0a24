//! Crash-safe catalog persistence: a JSON snapshot written by atomic rename.
//!
//! A missing state file is not an error — it yields empty catalogs, the same
//! stance the rest of the core takes on missing config. A malformed file is
//! fatal: the catalog cannot be trusted to continue from, so loading
//! surfaces [`LifecycleError::StateCorruption`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{Catalog, LifecycleError, Repository, Worktree};

/// The on-disk shape: `{"repositories": {...}, "worktrees": {...}}`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    repositories: HashMap<String, Repository>,
    #[serde(default)]
    worktrees: HashMap<Uuid, Worktree>,
}

/// Default state file path: `<workspace_dir>/.git-state`.
pub fn state_path(workspace_dir: &Path) -> PathBuf {
    workspace_dir.join(".git-state")
}

/// Load a catalog from `path`. A missing file yields an empty catalog;
/// malformed JSON is reported as [`LifecycleError::StateCorruption`].
pub fn load(path: &Path) -> Result<Catalog, LifecycleError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("no state file at {}, starting with an empty catalog", path.display());
            return Ok(Catalog::new());
        }
        Err(e) => {
            return Err(LifecycleError::StateCorruption { reason: e.to_string() });
        }
    };

    let snapshot: Snapshot = serde_json::from_str(&contents)
        .map_err(|e| LifecycleError::StateCorruption { reason: e.to_string() })?;
    Ok(Catalog::from_parts(snapshot.repositories, snapshot.worktrees))
}

/// Persist `catalog` to `path` via write-to-temp-then-rename, so a crash
/// mid-write never leaves a truncated state file behind (I6).
pub fn save(catalog: &Catalog, path: &Path) -> Result<(), LifecycleError> {
    let (repositories, worktrees) = catalog.snapshot();
    let snapshot = Snapshot { repositories, worktrees };
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| LifecycleError::StateCorruption { reason: e.to_string() })?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LifecycleError::StateCorruption { reason: e.to_string() })?;
    }

    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, json).map_err(|e| LifecycleError::StateCorruption { reason: e.to_string() })?;
    std::fs::rename(&tmp_path, path).map_err(|e| LifecycleError::StateCorruption { reason: e.to_string() })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn sample_repo() -> Repository {
        Repository::new("acme/widgets", PathBuf::from("/ws/repos/acme_widgets.git"), "main")
    }

    fn sample_worktree(repo_id: &str) -> Worktree {
        let now = crate::utils::get_now();
        Worktree {
            id: Uuid::new_v4(),
            repo_id: repo_id.to_string(),
            display_name: "widgets/felix".to_string(),
            path: PathBuf::from("/ws/widgets/felix"),
            branch: "refs/catnip/felix".to_string(),
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
    fn missing_file_yields_empty_catalog() {
        let dir = TempDir::new().unwrap();
        let path = state_path(dir.path());
        let catalog = load(&path).unwrap();
        assert!(catalog.list_repositories().is_empty());
        assert!(catalog.list_worktrees().is_empty());
    }

    #[test]
    fn malformed_file_is_state_corruption() {
        let dir = TempDir::new().unwrap();
        let path = state_path(dir.path());
        std::fs::write(&path, "not json at all").unwrap();
        let err = load(&path).unwrap_err();
        assert!(matches!(err, LifecycleError::StateCorruption { .. }));
    }

    // P3: round-trip law — saving then loading yields the same in-memory state.
    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = state_path(dir.path());

        let catalog = Catalog::new();
        let repo = sample_repo();
        let worktree = sample_worktree(&repo.id);
        catalog.commit_repository(repo.clone());
        catalog.commit_worktree(worktree.clone());

        save(&catalog, &path).unwrap();
        let reloaded = load(&path).unwrap();

        assert_eq!(reloaded.repository(&repo.id), Some(repo));
        assert_eq!(reloaded.worktree(worktree.id), Some(worktree));
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested").join("workspace");
        let path = state_path(&nested);
        let catalog = Catalog::new();
        save(&catalog, &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn wire_format_uses_spec_field_names() {
        let dir = TempDir::new().unwrap();
        let path = state_path(dir.path());
        let catalog = Catalog::new();
        catalog.commit_repository(sample_repo());
        save(&catalog, &path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("\"url\""));
        assert!(contents.contains("\"path\""));
        assert!(!contents.contains("bare_path"));
    }
}
