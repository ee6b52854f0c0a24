//! The Worktree Lifecycle Manager: create/delete/list/recover worktrees.

use std::path::{Path, PathBuf};

use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::git::gateway::CUSTOM_REF_NAMESPACE;
use crate::git::{Gateway, GitError};
use crate::utils::get_now;

use super::catalog::{Catalog, Repository, Worktree};
use super::error::LifecycleError;
use super::naming::{generate_session_name, NameAvailability};

const DIFF_FILE_CAP: usize = 100;
const DIFF_CONTENT_CAP_BYTES: usize = 100 * 1024;
const DIFF_READ_CAP_BYTES: u64 = 1024 * 1024;

struct GatewayAvailability<'a> {
    gateway: &'a Gateway,
    repo_path: &'a Path,
}

impl NameAvailability for GatewayAvailability<'_> {
    /// `branch` is already a fully qualified ref (e.g. `refs/catnip/felix`),
    /// matching `generate_session_name`'s own namespacing convention.
    fn branch_exists(&self, branch: &str) -> bool {
        self.gateway.ref_exists(self.repo_path, branch).unwrap_or(false)
    }
}

fn random_index() -> usize {
    (Uuid::new_v4().as_u128() % 1_000_000) as usize
}

/// The kind of change a composed diff entry represents (§4.2.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Added,
    Modified,
    Deleted,
    Untracked,
}

/// A single file's contribution to a composed worktree diff.
#[derive(Debug, Clone, Serialize)]
pub struct DiffEntry {
    pub path: String,
    pub change_type: ChangeType,
    pub old_content: Option<String>,
    pub new_content: Option<String>,
    pub unified_diff: String,
    /// Default expansion state: collapsed for purely added/deleted/untracked
    /// files, expanded for modifications and unstaged edits.
    pub expanded: bool,
}

pub struct LifecycleManager {
    gateway: Gateway,
    catalog: Catalog,
    config: Config,
}

impl LifecycleManager {
    pub fn new(gateway: Gateway, config: Config) -> Self {
        Self {
            gateway,
            catalog: Catalog::new(),
            config,
        }
    }

    pub fn with_catalog(gateway: Gateway, config: Config, catalog: Catalog) -> Self {
        Self {
            gateway,
            catalog,
            config,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn repo_bare_path(&self, org: &str, repo: &str) -> PathBuf {
        self.config.repos_dir.join(format!("{org}_{repo}.git"))
    }

    fn worktree_path(&self, repo_basename: &str, workspace_name: &str) -> PathBuf {
        self.config.workspace_dir.join(repo_basename).join(workspace_name)
    }

    // ------------------------------------------------------------- Checkout

    /// Idempotent: returns the existing repository record if already
    /// cloned, otherwise clones bare and creates the initial worktree.
    pub fn checkout_repository(
        &self,
        org: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> Result<Repository, LifecycleError> {
        let repo_id = format!("{org}/{repo}");
        if let Some(existing) = self.catalog.repository(&repo_id) {
            return Ok(existing);
        }

        let url = format!("https://github.com/{org}/{repo}.git");
        let bare_path = self.repo_bare_path(org, repo);
        if let Some(parent) = bare_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| LifecycleError::CloneFailed { url: url.clone(), reason: e.to_string() })?;
        }

        self.gateway
            .clone_bare(&url, &bare_path)
            .map_err(|e| LifecycleError::CloneFailed { url: url.clone(), reason: e.to_string() })?;

        let default_branch = self
            .gateway
            .default_branch(&bare_path, "origin")
            .unwrap_or_else(|_| "main".to_string());
        let source_branch = branch.unwrap_or(&default_branch).to_string();

        // GitRemoteUrl::repo_id is the canonical catalog id derived from the
        // URL itself, rather than re-deriving it from the caller's strings;
        // falls back to the caller-supplied org/repo pair if parsing fails.
        let stable_id = crate::git::GitRemoteUrl::parse(&url)
            .map(|parsed| parsed.repo_id())
            .unwrap_or_else(|| repo_id.clone());

        let mut repository = Repository::new(stable_id, bare_path.clone(), default_branch);
        repository.remote_url = Some(url.clone());
        self.catalog.commit_repository(repository.clone());
        let repo_id = repository.id.clone();

        self.create_worktree(&repo_id, &source_branch, None)?;

        Ok(repository)
    }

    // --------------------------------------------------------- CreateWorktree

    pub fn create_worktree(
        &self,
        repo_id: &str,
        source_branch: &str,
        desired_name: Option<&str>,
    ) -> Result<Worktree, LifecycleError> {
        let repository = self
            .catalog
            .repository(repo_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "repository", id: repo_id.to_string() })?;

        let availability = GatewayAvailability {
            gateway: &self.gateway,
            repo_path: &repository.bare_path,
        };

        let workspace_name = match desired_name {
            Some(name)
                if !availability.branch_exists(&format!("{CUSTOM_REF_NAMESPACE}{name}"))
                    && !self.catalog.branch_in_use(repo_id, &format!("{CUSTOM_REF_NAMESPACE}{name}")) =>
            {
                name.to_string()
            }
            _ => generate_session_name("refs/catnip", &availability, random_index),
        };

        let custom_ref = format!("{CUSTOM_REF_NAMESPACE}{workspace_name}");
        if self.catalog.branch_in_use(repo_id, &custom_ref) {
            return Err(LifecycleError::BranchInUse { branch: custom_ref });
        }

        let repo_basename = repo_id.rsplit('/').next().unwrap_or(repo_id);
        let path = self.worktree_path(repo_basename, &workspace_name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::ParseError(e.to_string()))?;
        }

        self.gateway
            .create_custom_ref_worktree(&repository.bare_path, &path, &custom_ref, source_branch)?;

        let commit_hash = self.gateway.rev_parse(&path, "HEAD")?;
        let (ahead, behind) = self
            .gateway
            .commit_count(&repository.bare_path, source_branch, &commit_hash)
            .unwrap_or((0, 0));

        let now = get_now();
        let worktree = Worktree {
            id: Uuid::new_v4(),
            repo_id: repo_id.to_string(),
            display_name: format!("{repo_basename}/{workspace_name}"),
            path,
            branch: custom_ref,
            source_branch: source_branch.to_string(),
            commit_hash,
            commits_ahead: ahead,
            commits_behind: behind,
            is_dirty: false,
            has_conflicts: false,
            has_been_renamed: false,
            created_at: now,
            last_accessed: now,
        };
        self.catalog.commit_worktree(worktree.clone());
        Ok(worktree)
    }

    // --------------------------------------------------------- DeleteWorktree

    /// Six-step best-effort cleanup: git worktree removal, branch deletion
    /// (if not equal to source), custom-ref deletion, nice-name map removal,
    /// forced directory removal, and garbage collection. Each step's failure
    /// is logged but does not abort the rest; the catalog entry is removed
    /// regardless (idempotent across partial prior failures).
    pub fn delete_worktree(&self, worktree_id: Uuid) -> Result<(), LifecycleError> {
        let worktree = self
            .catalog
            .worktree(worktree_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "worktree", id: worktree_id.to_string() })?;
        let repository = self
            .catalog
            .repository(&worktree.repo_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "repository", id: worktree.repo_id.clone() })?;

        if let Err(e) = self.gateway.remove_worktree(&repository.bare_path, &worktree.path, true) {
            log::warn!("worktree removal failed for {}: {e}", worktree.display_name);
        }

        if worktree.branch != worktree.source_branch
            && let Some(branch_name) = worktree.branch.strip_prefix("refs/heads/")
            && let Err(e) = self.gateway.delete_branch(&repository.bare_path, branch_name, true)
        {
            log::warn!("branch deletion failed for {}: {e}", worktree.display_name);
        }

        if worktree.branch.starts_with(CUSTOM_REF_NAMESPACE)
            && let Err(e) = self.gateway.delete_ref(&repository.bare_path, &worktree.branch)
        {
            log::warn!("custom-ref deletion failed for {}: {e}", worktree.display_name);
        }

        let encoded = urlencoding::encode(&worktree.branch).to_string();
        if let Err(e) = self
            .gateway
            .unset_config(&repository.bare_path, &format!("catnip.branch-map.{encoded}"))
        {
            log::warn!("nice-name map cleanup failed for {}: {e}", worktree.display_name);
        }

        if worktree.path.exists()
            && let Err(e) = std::fs::remove_dir_all(&worktree.path)
        {
            log::warn!("directory removal failed for {}: {e}", worktree.display_name);
        }

        if let Err(e) = self.gateway.prune_worktrees(&repository.bare_path) {
            log::warn!("worktree prune failed for {}: {e}", worktree.display_name);
        }

        self.catalog.remove_worktree(worktree_id);
        Ok(())
    }

    // ---------------------------------------------------------- ListWorktrees

    pub fn list_worktrees(&self) -> Vec<Worktree> {
        self.catalog.list_worktrees()
    }

    // --------------------------------------------------- RefreshWorktreeStatus

    pub fn refresh_worktree_status(&self, worktree_id: Uuid) -> Result<Worktree, LifecycleError> {
        let mut worktree = self
            .catalog
            .worktree(worktree_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "worktree", id: worktree_id.to_string() })?;

        worktree.is_dirty = self.gateway.is_dirty(&worktree.path)?;
        worktree.has_conflicts = self.gateway.has_conflicts(&worktree.path)?;
        worktree.commit_hash = self.gateway.rev_parse(&worktree.path, "HEAD")?;

        let (ahead, behind) = self
            .gateway
            .commit_count(&worktree.path, &worktree.source_branch, "HEAD")
            .unwrap_or((worktree.commits_ahead, worktree.commits_behind));
        worktree.commits_ahead = ahead;
        worktree.commits_behind = behind;

        if !worktree.has_been_renamed
            && let Ok(actual) = self.gateway.display_branch(&worktree.path, &worktree.path)
        {
            let actual_ref = format!("{CUSTOM_REF_NAMESPACE}{actual}");
            if actual_ref != worktree.branch && worktree.branch.starts_with(CUSTOM_REF_NAMESPACE) {
                worktree.branch = actual_ref;
            }
        }

        worktree.last_accessed = get_now();
        self.catalog.commit_worktree(worktree.clone());
        Ok(worktree)
    }

    // -------------------------------------------------------- RenameWorktree

    pub fn rename_worktree(&self, worktree_id: Uuid, new_display: &str) -> Result<Worktree, LifecycleError> {
        let mut worktree = self
            .catalog
            .worktree(worktree_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "worktree", id: worktree_id.to_string() })?;
        let repository = self
            .catalog
            .repository(&worktree.repo_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "repository", id: worktree.repo_id.clone() })?;

        self.gateway.set_config(
            &repository.bare_path,
            &format!("catnip.branch-map.{}", urlencoding::encode(&worktree.branch)),
            new_display,
            false,
        )?;

        worktree.has_been_renamed = true;
        worktree.display_name = new_display.to_string();
        self.catalog.commit_worktree(worktree.clone());
        Ok(worktree)
    }

    // -------------------------------------------------------------- PushWorktree

    /// Push a worktree's current HEAD to `<remote>/<branch>` (§4.1). Before
    /// pushing, consults the workflow-change detector; unless
    /// `allow_workflow_changes` is set, a push that would add or modify a
    /// `.github/workflows/*` file is refused with `PreconditionFailed` rather
    /// than sent with credentials that may lack workflow authority.
    pub fn push_worktree(&self, worktree_id: Uuid, remote: &str, allow_workflow_changes: bool) -> Result<(), LifecycleError> {
        let worktree = self
            .catalog
            .worktree(worktree_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "worktree", id: worktree_id.to_string() })?;

        let branch_name = worktree
            .branch
            .strip_prefix(CUSTOM_REF_NAMESPACE)
            .or_else(|| worktree.branch.strip_prefix("refs/heads/"))
            .unwrap_or(worktree.branch.as_str());
        let upstream_ref = format!("{remote}/{branch_name}");

        if !allow_workflow_changes
            && self
                .gateway
                .push_contains_workflow_changes(&worktree.path, &upstream_ref)
                .unwrap_or(false)
        {
            return Err(GitError::PreconditionFailed {
                reason: format!("push to {upstream_ref} would include workflow-file changes"),
            }
            .into());
        }

        let mut strategy = crate::git::PushStrategy::new(remote, format!("HEAD:refs/heads/{branch_name}"));
        strategy.convert_https = self.config.runtime_mode == crate::config::RuntimeMode::Containerized;
        self.gateway.push(&worktree.path, &strategy, self.config.runtime_mode)?;
        Ok(())
    }

    // -------------------------------------------------------- CleanupMerged

    /// Scans the catalog for eligible worktrees (clean, conflict-free, fully
    /// landed, never renamed) whose branch is merged into its source branch,
    /// and deletes each. Per-worktree failures are collected rather than
    /// aborting the sweep.
    pub fn cleanup_merged(&self) -> Vec<(Uuid, Result<(), LifecycleError>)> {
        let mut results = Vec::new();
        for worktree in self.catalog.list_worktrees() {
            if !worktree.is_cleanup_eligible() {
                continue;
            }
            let Some(repository) = self.catalog.repository(&worktree.repo_id) else {
                continue;
            };

            let merged = self
                .gateway
                .list_merged_branches(&repository.bare_path, &worktree.source_branch)
                .map(|branches| branches.iter().any(|b| worktree.branch.ends_with(b.as_str())))
                .unwrap_or(false);

            if merged {
                results.push((worktree.id, self.delete_worktree(worktree.id)));
            }
        }
        results
    }

    // -------------------------------------------------------- Diff composition

    /// Compose a worktree's diff from three sources: committed changes
    /// relative to the merge-base with `source_branch`, unstaged changes,
    /// and untracked files (§4.2.3).
    pub fn compose_diff(&self, worktree_id: Uuid) -> Result<Vec<DiffEntry>, LifecycleError> {
        let worktree = self
            .catalog
            .worktree(worktree_id)
            .ok_or_else(|| LifecycleError::NotFound { kind: "worktree", id: worktree_id.to_string() })?;

        let mut entries = Vec::new();

        let merge_base = self
            .gateway
            .merge_base(&worktree.path, &worktree.source_branch, "HEAD")
            .unwrap_or_else(|_| worktree.source_branch.clone());
        let committed_range = format!("{merge_base}..HEAD");

        let mut stats = crate::git::diff::DiffStats::default();
        self.collect_diff_entries(&worktree.path, Some(&committed_range), false, &mut entries, &mut stats)?;
        self.collect_diff_entries(&worktree.path, None, true, &mut entries, &mut stats)?;
        self.collect_untracked_entries(&worktree.path, &mut entries)?;

        entries.truncate(DIFF_FILE_CAP);
        log::debug!("composed diff for {}: {}", worktree.display_name, stats.format_summary().join(", "));
        Ok(entries)
    }

    fn collect_diff_entries(
        &self,
        worktree_path: &Path,
        range: Option<&str>,
        expanded_default: bool,
        entries: &mut Vec<DiffEntry>,
        stats: &mut crate::git::diff::DiffStats,
    ) -> Result<(), LifecycleError> {
        if entries.len() >= DIFF_FILE_CAP {
            return Ok(());
        }
        let numstat = self.gateway.diff_numstat(worktree_path, range)?;
        for line in numstat.lines() {
            if entries.len() >= DIFF_FILE_CAP {
                break;
            }
            let Some(path) = line.rsplit('\t').next() else { continue };
            stats.files += 1;
            if let Some((added, deleted)) = crate::git::diff::parse_numstat_line(line) {
                stats.insertions += added;
                stats.deletions += deleted;
            }
            let patch = self
                .gateway
                .diff_patch(worktree_path, range, path)
                .unwrap_or_default();
            let change_type = if patch.contains("\nnew file mode") {
                ChangeType::Added
            } else if patch.contains("\ndeleted file mode") {
                ChangeType::Deleted
            } else {
                ChangeType::Modified
            };
            let expanded = expanded_default || change_type == ChangeType::Modified;
            entries.push(DiffEntry {
                path: path.to_string(),
                change_type,
                old_content: None,
                new_content: None,
                unified_diff: truncate_content(&patch),
                expanded,
            });
        }
        Ok(())
    }

    fn collect_untracked_entries(&self, worktree_path: &Path, entries: &mut Vec<DiffEntry>) -> Result<(), LifecycleError> {
        if entries.len() >= DIFF_FILE_CAP {
            return Ok(());
        }
        let status = self.gateway.porcelain_status(worktree_path)?;
        for line in status.lines() {
            if entries.len() >= DIFF_FILE_CAP {
                break;
            }
            let Some(path) = line.strip_prefix("?? ") else { continue };
            let full_path = worktree_path.join(path);
            let content = read_capped(&full_path);
            entries.push(DiffEntry {
                path: path.to_string(),
                change_type: ChangeType::Untracked,
                old_content: None,
                new_content: content,
                unified_diff: String::new(),
                expanded: false,
            });
        }
        Ok(())
    }
}

fn truncate_content(content: &str) -> String {
    if content.len() <= DIFF_CONTENT_CAP_BYTES {
        return content.to_string();
    }
    let mut truncated = content.as_bytes()[..DIFF_CONTENT_CAP_BYTES].to_vec();
    while String::from_utf8(truncated.clone()).is_err() {
        truncated.pop();
    }
    let mut result = String::from_utf8(truncated).unwrap_or_default();
    result.push_str("\n... (truncated)");
    result
}

fn read_capped(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    if metadata.len() > DIFF_READ_CAP_BYTES {
        return None;
    }
    std::fs::read_to_string(path).ok().map(|s| truncate_content(&s))
}
