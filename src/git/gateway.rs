//! Gateway: typed Git operations built on top of a [`CommandExecutor`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;

use super::error::GitError;
use super::executor::{require_success, CommandExecutor, DEFAULT_NETWORK_TIMEOUT};
use super::parse::{self, DefaultBranchName};
use super::WorktreeList;

/// The namespace custom-ref worktrees live under before they're given a
/// human name. A legacy unprefixed form (`catnip/<name>`) is recognized for
/// read/compat but never written.
pub const CUSTOM_REF_NAMESPACE: &str = "refs/catnip/";
const LEGACY_CUSTOM_REF_PREFIX: &str = "catnip/";

/// Unmerged index status pairs reported by `git status --porcelain` while a
/// merge/rebase/cherry-pick is paused for manual resolution.
pub const UNMERGED_STATUS_CODES: [&str; 7] = ["UU", "AA", "DD", "AU", "UA", "DU", "UD"];

fn is_unmerged_status_line(line: &str) -> bool {
    UNMERGED_STATUS_CODES.iter().any(|code| line.starts_with(code))
}

/// `{branch, remote, depth, prune, refspecs[], timeout}` — two presets are
/// provided: `fast` (single-branch, depth=1, for status polling) and `full`
/// (no depth, prune, for history-dependent operations).
#[derive(Debug, Clone)]
pub struct FetchStrategy {
    pub branch: Option<String>,
    pub remote: String,
    pub depth: Option<u32>,
    pub prune: bool,
    pub refspecs: Vec<String>,
    pub timeout: Duration,
}

impl FetchStrategy {
    pub fn fast(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            remote: remote.into(),
            depth: Some(1),
            prune: false,
            refspecs: Vec::new(),
            timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }

    pub fn full(remote: impl Into<String>) -> Self {
        Self {
            branch: None,
            remote: remote.into(),
            depth: None,
            prune: true,
            refspecs: Vec::new(),
            timeout: DEFAULT_NETWORK_TIMEOUT,
        }
    }

    fn to_argv(&self) -> Vec<String> {
        let mut argv = vec!["fetch".to_string()];
        if self.prune {
            argv.push("--prune".to_string());
        }
        if let Some(depth) = self.depth {
            argv.push(format!("--depth={depth}"));
        }
        argv.push(self.remote.clone());
        if let Some(branch) = &self.branch {
            argv.push(branch.clone());
        }
        argv.extend(self.refspecs.iter().cloned());
        argv
    }
}

/// `{branch, remote, set_upstream, force, convert_https}`. When
/// `convert_https` is set and the runtime is containerized, the push runs
/// with a one-shot inline `url.insteadOf` rewrite; in `native` runtime mode
/// the flag is ignored.
#[derive(Debug, Clone)]
pub struct PushStrategy {
    pub branch: String,
    pub remote: String,
    pub set_upstream: bool,
    pub force: bool,
    pub convert_https: bool,
}

impl PushStrategy {
    pub fn new(remote: impl Into<String>, branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            remote: remote.into(),
            set_upstream: true,
            force: false,
            convert_https: false,
        }
    }

    /// Build the exact argv for this push, given whether the runtime is
    /// containerized (scenario 6: native vs. containerized push argv).
    pub fn to_argv(&self, containerized: bool) -> Vec<String> {
        let mut argv = Vec::new();
        if self.convert_https && containerized {
            argv.push("-c".to_string());
            argv.push("url.https://github.com/.insteadOf=git@github.com:".to_string());
        }
        argv.push("push".to_string());
        if self.force {
            argv.push("--force".to_string());
        }
        if self.set_upstream {
            argv.push("-u".to_string());
        }
        argv.push(self.remote.clone());
        argv.push(self.branch.clone());
        argv
    }
}

/// Single typed surface for Git mutations and queries, backed by a pluggable
/// [`CommandExecutor`]. Callers never know whether they're talking to the
/// real `git` binary or the deterministic in-memory test double.
#[derive(Clone)]
pub struct Gateway {
    executor: Arc<dyn CommandExecutor>,
}

impl Gateway {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    fn argv_refs<'a>(args: &'a [String]) -> Vec<&'a str> {
        args.iter().map(String::as_str).collect()
    }

    // ---------------------------------------------------------------- Query

    pub fn is_git_repo(&self, dir: &Path) -> bool {
        self.executor
            .execute(dir, &["rev-parse", "--is-inside-work-tree"])
            .map(|o| o.success)
            .unwrap_or(false)
    }

    pub fn rev_parse(&self, dir: &Path, rev: &str) -> Result<String, GitError> {
        let out = require_success(&["rev-parse", rev], self.executor.execute(dir, &["rev-parse", rev])?)?;
        Ok(out.stdout.trim().to_string())
    }

    pub fn current_branch(&self, dir: &Path) -> Result<Option<String>, GitError> {
        let out = self.executor.execute(dir, &["symbolic-ref", "--short", "-q", "HEAD"])?;
        if out.success {
            let branch = out.stdout.trim();
            Ok(if branch.is_empty() { None } else { Some(branch.to_string()) })
        } else {
            Ok(None)
        }
    }

    pub fn branch_exists(&self, dir: &Path, branch: &str, remote: Option<&str>) -> Result<bool, GitError> {
        let refname = match remote {
            Some(r) => format!("refs/remotes/{r}/{branch}"),
            None => format!("refs/heads/{branch}"),
        };
        let out = self
            .executor
            .execute(dir, &["show-ref", "--verify", "--quiet", refname.as_str()])?;
        Ok(out.success)
    }

    /// Whether `git_ref` (a fully qualified ref, e.g. `refs/catnip/felix`)
    /// resolves to anything.
    pub fn ref_exists(&self, dir: &Path, git_ref: &str) -> Result<bool, GitError> {
        let args = ["show-ref", "--verify", "--quiet", git_ref];
        let out = self.executor.execute(dir, &args)?;
        Ok(out.success)
    }

    pub fn list_branches(&self, dir: &Path, remote: bool) -> Result<Vec<String>, GitError> {
        let pattern = if remote { "refs/remotes/" } else { "refs/heads/" };
        let out = require_success(
            &["for-each-ref", "--format=%(refname)", pattern],
            self.executor.execute(dir, &["for-each-ref", "--format=%(refname)", pattern])?,
        )?;
        Ok(out
            .stdout
            .lines()
            .filter_map(|l| l.strip_prefix(pattern).map(str::to_string))
            .collect())
    }

    /// Branches whose tip is an ancestor of `target` (i.e. already merged).
    pub fn list_merged_branches(&self, dir: &Path, target: &str) -> Result<Vec<String>, GitError> {
        let args = ["branch", "--format=%(refname:short)", "--merged", target];
        let out = require_success(&args, self.executor.execute(dir, &args)?)?;
        Ok(out.stdout.lines().map(str::to_string).filter(|b| b != target).collect())
    }

    /// `(ahead, behind)` commit counts between `base` and `head`.
    pub fn commit_count(&self, dir: &Path, base: &str, head: &str) -> Result<(usize, usize), GitError> {
        let spec = format!("{base}...{head}");
        let args = ["rev-list", "--left-right", "--count", spec.as_str()];
        let out = require_success(&args, self.executor.execute(dir, &args)?)?;
        let mut parts = out.stdout.trim().split_whitespace();
        let behind = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let ahead = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        Ok((ahead, behind))
    }

    /// Dry-run merge via `merge-tree --write-tree` (§4.4). Exit status 1 is
    /// not an error: it indicates conflicts and is accompanied by output the
    /// caller parses for the conflicted file list.
    pub fn merge_tree(&self, repo_dir: &Path, target: &str, source: &str) -> Result<String, GitError> {
        let args = ["merge-tree", "--write-tree", target, source];
        let out = self.executor.execute(repo_dir, &args)?;
        Ok(out.combined())
    }

    pub fn merge_base(&self, dir: &Path, a: &str, b: &str) -> Result<String, GitError> {
        let args = ["merge-base", a, b];
        let out = require_success(&args, self.executor.execute(dir, &args)?)?;
        Ok(out.stdout.trim().to_string())
    }

    /// `git diff --numstat` between `range` (e.g. `"<merge-base>..HEAD"`) and
    /// the working tree, or unstaged changes when `range` is `None`.
    pub fn diff_numstat(&self, dir: &Path, range: Option<&str>) -> Result<String, GitError> {
        let mut argv = vec!["diff", "--numstat"];
        if let Some(r) = range {
            argv.push(r);
        }
        let out = require_success(&argv, self.executor.execute(dir, &argv)?)?;
        Ok(out.stdout)
    }

    /// Unified diff text for a single file, either against `range` or
    /// unstaged when `range` is `None`.
    pub fn diff_patch(&self, dir: &Path, range: Option<&str>, path: &str) -> Result<String, GitError> {
        let mut argv = vec!["diff"];
        if let Some(r) = range {
            argv.push(r);
        }
        argv.push("--");
        argv.push(path);
        let out = require_success(&argv, self.executor.execute(dir, &argv)?)?;
        Ok(out.stdout)
    }

    pub fn remote_url(&self, dir: &Path, remote: &str) -> Result<Option<String>, GitError> {
        let args = ["remote", "get-url", remote];
        let out = self.executor.execute(dir, &args)?;
        Ok(if out.success {
            Some(out.stdout.trim().to_string())
        } else {
            None
        })
    }

    /// Resolve the repository's default branch: `origin/HEAD` locally if
    /// known, otherwise a network `ls-remote --symref` query.
    pub fn default_branch(&self, dir: &Path, remote: &str) -> Result<String, GitError> {
        let head_ref = format!("refs/remotes/{remote}/HEAD");
        let local = self
            .executor
            .execute(dir, &["symbolic-ref", "--short", "-q", head_ref.as_str()])?;
        if local.success && !local.stdout.trim().is_empty() {
            return Ok(DefaultBranchName::from_local(remote, &local.stdout)?.into_string());
        }

        let args = ["ls-remote", "--symref", remote, "HEAD"];
        let out = self.executor.execute_with_timeout(dir, &args, DEFAULT_NETWORK_TIMEOUT)?;
        if out.success {
            return Ok(DefaultBranchName::from_remote(&out.stdout)?.into_string());
        }

        // Boundary case: repo with only `master` and no `main`. Fall back to
        // whichever of the two conventional names actually exists locally.
        for candidate in ["main", "master"] {
            if self.branch_exists(dir, candidate, None)? {
                return Ok(candidate.to_string());
            }
        }
        Err(GitError::ParseError("could not determine default branch".into()))
    }

    /// Display-branch resolution (§4.1): symbolic HEAD, resolved through the
    /// nice-name map when the ref is in the catnip namespace, otherwise the
    /// short branch name; a detached HEAD returns the short hash.
    pub fn display_branch(&self, worktree_path: &Path, repo_dir: &Path) -> Result<String, GitError> {
        let args = ["symbolic-ref", "-q", "HEAD"];
        let out = self.executor.execute(worktree_path, &args)?;
        if !out.success {
            // Detached HEAD: fall back to the short commit hash.
            let short_args = ["rev-parse", "--short", "HEAD"];
            let short = require_success(&short_args, self.executor.execute(worktree_path, &short_args)?)?;
            return Ok(short.stdout.trim().to_string());
        }

        let head_ref = out.stdout.trim();
        if let Some(nice_name) = self.nice_name_for_ref(repo_dir, head_ref)? {
            return Ok(nice_name);
        }
        Ok(head_ref.strip_prefix("refs/heads/").unwrap_or(head_ref).to_string())
    }

    /// Look up `catnip.branch-map.<encoded-ref>` for a custom-namespace ref.
    pub fn nice_name_for_ref(&self, repo_dir: &Path, git_ref: &str) -> Result<Option<String>, GitError> {
        let is_custom = git_ref.starts_with(CUSTOM_REF_NAMESPACE) || git_ref.starts_with(LEGACY_CUSTOM_REF_PREFIX);
        if !is_custom {
            return Ok(None);
        }
        let key = format!("catnip.branch-map.{}", urlencoding::encode(git_ref));
        let args = ["config", "--get", key.as_str()];
        let out = self.executor.execute(repo_dir, &args)?;
        Ok(if out.success {
            let value = out.stdout.trim();
            if value.is_empty() { None } else { Some(value.to_string()) }
        } else {
            None
        })
    }

    pub fn list_worktrees(&self, repo_dir: &Path) -> Result<WorktreeList, GitError> {
        let args = ["worktree", "list", "--porcelain"];
        let out = require_success(&args, self.executor.execute(repo_dir, &args)?)?;
        let entries = parse::parse_porcelain_list(&out.stdout)?;
        Ok(WorktreeList::from_raw(entries))
    }

    // --------------------------------------------------------------- Status

    /// Fast-path dirtiness check (§4.2.2): `diff-index --quiet HEAD` then
    /// `ls-files --others --exclude-standard`.
    pub fn is_dirty(&self, worktree_path: &Path) -> Result<bool, GitError> {
        let tracked = self
            .executor
            .execute(worktree_path, &["diff-index", "--quiet", "HEAD"])?;
        if !tracked.success {
            return Ok(true);
        }
        let untracked = require_success(
            &["ls-files", "--others", "--exclude-standard"],
            self.executor
                .execute(worktree_path, &["ls-files", "--others", "--exclude-standard"])?,
        )?;
        Ok(!untracked.stdout.trim().is_empty())
    }

    pub fn porcelain_status(&self, worktree_path: &Path) -> Result<String, GitError> {
        let args = ["status", "--porcelain"];
        let out = require_success(&args, self.executor.execute(worktree_path, &args)?)?;
        Ok(out.stdout)
    }

    /// Active-conflict detection (§4.2.2 / §4.4): a rebase/merge/cherry-pick
    /// state directory exists, or `status --porcelain` reports an unmerged
    /// pair.
    pub fn has_conflicts(&self, worktree_path: &Path) -> Result<bool, GitError> {
        for marker in ["rebase-apply", "rebase-merge", "MERGE_HEAD", "CHERRY_PICK_HEAD"] {
            if self.git_state_path(worktree_path, marker)?.is_some() {
                return Ok(true);
            }
        }
        let status = self.porcelain_status(worktree_path)?;
        Ok(status.lines().any(is_unmerged_status_line))
    }

    fn git_state_path(&self, worktree_path: &Path, marker: &str) -> Result<Option<PathBuf>, GitError> {
        let args = ["rev-parse", "--git-dir"];
        let out = require_success(&args, self.executor.execute(worktree_path, &args)?)?;
        let git_dir = worktree_path.join(out.stdout.trim());
        let candidate = git_dir.join(marker);
        Ok(if candidate.exists() { Some(candidate) } else { None })
    }

    // -------------------------------------------------------------- Mutate

    pub fn create_branch(&self, repo_dir: &Path, branch: &str, from_ref: &str) -> Result<(), GitError> {
        let args = ["branch", branch, from_ref];
        require_success(&args, self.executor.execute(repo_dir, &args)?)?;
        Ok(())
    }

    pub fn delete_branch(&self, repo_dir: &Path, branch: &str, force: bool) -> Result<(), GitError> {
        let flag = if force { "-D" } else { "-d" };
        let args = ["branch", flag, branch];
        let out = self.executor.execute(repo_dir, &args)?;
        if !out.success && !out.combined().contains("not found") {
            return Err(GitError::command_failed(&args, out.exit_code, out.combined()));
        }
        Ok(())
    }

    pub fn set_config(&self, dir: &Path, key: &str, value: &str, global: bool) -> Result<(), GitError> {
        let mut args = vec!["config"];
        if global {
            args.push("--global");
        }
        args.push(key);
        args.push(value);
        require_success(&args, self.executor.execute(dir, &args)?)?;
        Ok(())
    }

    pub fn unset_config(&self, dir: &Path, key: &str) -> Result<(), GitError> {
        let args = ["config", "--unset", key];
        let out = self.executor.execute(dir, &args)?;
        // "key not found" from --unset is not an error for an idempotent caller.
        if !out.success && out.exit_code != Some(5) {
            return Err(GitError::command_failed(&args, out.exit_code, out.combined()));
        }
        Ok(())
    }

    pub fn remove_worktree(&self, repo_dir: &Path, worktree_path: &Path, force: bool) -> Result<(), GitError> {
        let path_str = worktree_path.to_string_lossy().to_string();
        let mut args = vec!["worktree".to_string(), "remove".to_string()];
        if force {
            args.push("--force".to_string());
        }
        args.push(path_str);
        let argv = Self::argv_refs(&args);
        let out = self.executor.execute(repo_dir, &argv)?;
        if !out.success {
            return Err(GitError::command_failed(&argv, out.exit_code, out.combined()));
        }
        Ok(())
    }

    pub fn prune_worktrees(&self, repo_dir: &Path) -> Result<(), GitError> {
        let args = ["worktree", "prune"];
        require_success(&args, self.executor.execute(repo_dir, &args)?)?;
        Ok(())
    }

    pub fn add_all(&self, worktree_path: &Path) -> Result<(), GitError> {
        let args = ["add", "."];
        require_success(&args, self.executor.execute(worktree_path, &args)?)?;
        Ok(())
    }

    /// Commit staged changes. Returns `None` (not an error) when there is
    /// nothing to commit — M2: the Monitor treats this as success-no-op.
    pub fn commit(&self, worktree_path: &Path, message: &str) -> Result<Option<String>, GitError> {
        let args = ["commit", "-m", message];
        let out = self.executor.execute(worktree_path, &args)?;
        if out.success {
            return Ok(Some(self.rev_parse(worktree_path, "HEAD")?));
        }
        if out.combined().contains("nothing to commit") {
            return Ok(None);
        }
        Err(GitError::command_failed(&args, out.exit_code, out.combined()))
    }

    /// Clone `url` as a bare repository at `dest`, run from `dest`'s parent
    /// directory (which must already exist).
    pub fn clone_bare(&self, url: &str, dest: &Path) -> Result<(), GitError> {
        let parent = dest.parent().unwrap_or_else(|| Path::new("."));
        let dest_str = dest.to_string_lossy().to_string();
        let args = ["clone", "--bare", url, dest_str.as_str()];
        let out = self
            .executor
            .execute_with_timeout(parent, &args, DEFAULT_NETWORK_TIMEOUT)?;
        if !out.success {
            return Err(GitError::command_failed(&args, out.exit_code, out.combined()));
        }
        Ok(())
    }

    pub fn fetch(&self, dir: &Path, strategy: &FetchStrategy) -> Result<(), GitError> {
        let args = strategy.to_argv();
        let argv = Self::argv_refs(&args);
        let out = self.executor.execute_with_timeout(dir, &argv, strategy.timeout)?;
        if !out.success {
            return Err(GitError::command_failed(&argv, out.exit_code, out.combined()));
        }
        Ok(())
    }

    pub fn push(&self, dir: &Path, strategy: &PushStrategy, runtime: crate::config::RuntimeMode) -> Result<(), GitError> {
        let containerized = runtime == crate::config::RuntimeMode::Containerized;
        let args = strategy.to_argv(containerized);
        let argv = Self::argv_refs(&args);
        let out = self
            .executor
            .execute_with_timeout(dir, &argv, DEFAULT_NETWORK_TIMEOUT)?;
        if !out.success {
            return Err(GitError::command_failed(&argv, out.exit_code, out.combined()));
        }
        Ok(())
    }

    // ---------------------------------------------------- Custom-ref worktrees

    /// Create a worktree on an arbitrary ref in three atomic steps (§4.1):
    /// detached checkout at `from_ref`, `update-ref` in the main repo, then
    /// `symbolic-ref HEAD` inside the new worktree. Any failure after the
    /// detached checkout rolls it back by removing the worktree.
    pub fn create_custom_ref_worktree(
        &self,
        repo_dir: &Path,
        worktree_path: &Path,
        custom_ref: &str,
        from_ref: &str,
    ) -> Result<(), GitError> {
        let path_str = worktree_path.to_string_lossy().to_string();
        let detach_args = ["worktree", "add", "--detach", path_str.as_str(), from_ref];
        let out = self.executor.execute(repo_dir, &detach_args)?;
        if !out.success {
            return Err(GitError::command_failed(&detach_args, out.exit_code, out.combined()));
        }

        let commit = match self.rev_parse(worktree_path, "HEAD") {
            Ok(c) => c,
            Err(e) => {
                let _ = self.remove_worktree(repo_dir, worktree_path, true);
                return Err(e);
            }
        };

        let update_ref_args = ["update-ref", custom_ref, commit.as_str()];
        if let Err(e) = require_success(&update_ref_args, self.executor.execute(repo_dir, &update_ref_args)?) {
            let _ = self.remove_worktree(repo_dir, worktree_path, true);
            return Err(e);
        }

        let symbolic_ref_args = ["symbolic-ref", "HEAD", custom_ref];
        if let Err(e) = require_success(
            &symbolic_ref_args,
            self.executor.execute(worktree_path, &symbolic_ref_args)?,
        ) {
            let _ = self.remove_worktree(repo_dir, worktree_path, true);
            return Err(e);
        }

        Ok(())
    }

    pub fn delete_ref(&self, repo_dir: &Path, git_ref: &str) -> Result<(), GitError> {
        let args = ["update-ref", "-d", git_ref];
        let out = self.executor.execute(repo_dir, &args)?;
        if !out.success && !out.combined().contains("not a valid ref") {
            return Err(GitError::command_failed(&args, out.exit_code, out.combined()));
        }
        Ok(())
    }

    // ----------------------------------------------------- Workflow detector

    /// A workflow file: path prefix `.github/workflows/` and a `.yml`/`.yaml`
    /// extension.
    pub fn is_workflow_file(path: &str) -> bool {
        path.starts_with(".github/workflows/") && (path.ends_with(".yml") || path.ends_with(".yaml"))
    }

    /// Whether a push from `dir` to `upstream_ref` would include any added or
    /// modified workflow file, either in committed-but-unpushed commits or in
    /// the working tree relative to upstream.
    pub fn push_contains_workflow_changes(&self, dir: &Path, upstream_ref: &str) -> Result<bool, GitError> {
        let spec = format!("{upstream_ref}..HEAD");
        let args = ["diff", "--name-only", spec.as_str()];
        let committed = self.executor.execute(dir, &args)?;
        if committed.success && committed.stdout.lines().any(Self::is_workflow_file) {
            return Ok(true);
        }

        let wt_args = ["diff", "--name-only", upstream_ref];
        let working_tree = require_success(&wt_args, self.executor.execute(dir, &wt_args)?)?;
        Ok(working_tree.stdout.lines().any(Self::is_workflow_file))
    }
}

/// Extract the conflict file set from `git merge-tree` dry-run output
/// (§4.4). A file is conflicted if a line begins with `CONFLICT` and
/// contains `" in <path>"`. If no paths parse but classical conflict markers
/// or the bare token `CONFLICT` appear, the set falls back to
/// `{"(multiple files)"}`.
pub fn parse_merge_tree_conflicts(output: &str) -> Vec<String> {
    let conflict_line = Regex::new(r"^CONFLICT.* in (.+)$").expect("valid regex");
    let mut files: Vec<String> = output
        .lines()
        .filter_map(|line| conflict_line.captures(line))
        .map(|caps| caps[1].trim().to_string())
        .collect();
    files.dedup();

    if files.is_empty()
        && (output.contains("<<<<<<<")
            || output.contains("=======")
            || output.contains(">>>>>>>")
            || output.contains("CONFLICT"))
    {
        files.push("(multiple files)".to_string());
    }

    files
}
