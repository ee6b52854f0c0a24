//! Per-worktree Session Monitor: the checkpoint-commit state machine.

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::git::Gateway;
use crate::utils::get_now;

/// §4.3's state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Idle,
    PendingCheckpoint,
    Committing,
    TitleRotation,
}

/// Local state protected by the Monitor's own reader/writer lock: never
/// shared process-wide (only the PTY title store is).
#[derive(Debug)]
struct MonitorData {
    state: MonitorState,
    last_commit_time: u64,
    checkpoint_count: u32,
    current_title: Option<String>,
    previous_title: Option<String>,
    last_event_time: Option<u64>,
    watcher_active: bool,
}

/// Drives checkpoint commits for one live worktree. Owns no thread itself;
/// `tick` is called by a supervisor loop (or test harness) at the watcher's
/// debounce cadence.
pub struct Monitor {
    worktree_path: PathBuf,
    gateway: Gateway,
    checkpoint_timeout: Duration,
    data: RwLock<MonitorData>,
}

impl Monitor {
    pub fn new(worktree_path: PathBuf, gateway: Gateway, checkpoint_timeout: Duration) -> Self {
        let now = get_now();
        Self {
            worktree_path,
            gateway,
            checkpoint_timeout,
            data: RwLock::new(MonitorData {
                state: MonitorState::Idle,
                last_commit_time: now,
                checkpoint_count: 0,
                current_title: None,
                previous_title: None,
                last_event_time: None,
                watcher_active: true,
            }),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.data.read().unwrap().state
    }

    pub fn checkpoint_count(&self) -> u32 {
        self.data.read().unwrap().checkpoint_count
    }

    /// M4: record that the file watcher failed to initialize. Status polling
    /// continues but no commits occur while the watcher is absent.
    pub fn mark_watcher_failed(&self) {
        self.data.write().unwrap().watcher_active = false;
    }

    /// A filesystem event was observed; transitions Idle -> PendingCheckpoint
    /// and resets the debounce clock.
    pub fn on_fs_event(&self, now: u64) {
        let mut data = self.data.write().unwrap();
        if !data.watcher_active {
            return;
        }
        data.state = MonitorState::PendingCheckpoint;
        data.last_event_time = Some(now);
    }

    /// Observe the session title; if it differs from the current one this is
    /// a title-rotation boundary.
    pub fn observe_title(&self, title: Option<String>) {
        let mut data = self.data.write().unwrap();
        if data.current_title != title {
            data.previous_title = data.current_title.take();
            data.current_title = title;
            if data.previous_title.is_some() {
                data.state = MonitorState::TitleRotation;
            }
        }
    }

    /// Evaluate the debounce/timeout condition and attempt a checkpoint
    /// commit if due. `now` is supplied by the caller so tests are
    /// deterministic; in production this is [`crate::utils::get_now`].
    ///
    /// M1: at most one commit per debounce window, gated by
    /// `checkpoint_timeout` since the previous successful commit.
    pub fn tick(&self, now: u64) -> Option<String> {
        let debounce_elapsed = {
            let data = self.data.read().unwrap();
            if !data.watcher_active {
                return None;
            }
            match data.last_event_time {
                Some(t) => now.saturating_sub(t) >= 2,
                None => false,
            }
        };
        if !debounce_elapsed {
            return None;
        }

        let should_rotate = {
            let data = self.data.read().unwrap();
            data.state == MonitorState::TitleRotation
        };
        if should_rotate {
            return self.commit_title_rotation(now);
        }

        let ready = {
            let data = self.data.read().unwrap();
            data.state == MonitorState::PendingCheckpoint
                && now.saturating_sub(data.last_commit_time) >= self.checkpoint_timeout.as_secs()
                && data.current_title.is_some()
        };
        if !ready {
            return None;
        }

        self.commit_checkpoint(now)
    }

    fn commit_checkpoint(&self, now: u64) -> Option<String> {
        {
            self.data.write().unwrap().state = MonitorState::Committing;
        }

        let (title, next_count) = {
            let data = self.data.read().unwrap();
            (data.current_title.clone()?, data.checkpoint_count + 1)
        };
        let message = format!("{title} checkpoint: {next_count}");

        let result = self.gateway.add_all(&self.worktree_path).and_then(|_| self.gateway.commit(&self.worktree_path, &message));

        let mut data = self.data.write().unwrap();
        match result {
            Ok(Some(hash)) => {
                data.checkpoint_count = next_count;
                data.last_commit_time = now;
                data.state = MonitorState::Idle;
                data.last_event_time = None;
                Some(hash)
            }
            Ok(None) => {
                // M2: nothing to commit is a success-no-op, not a failure.
                data.state = MonitorState::Idle;
                data.last_event_time = None;
                None
            }
            Err(e) => {
                log::warn!("checkpoint commit failed for {}: {e}", self.worktree_path.display());
                data.state = MonitorState::PendingCheckpoint;
                None
            }
        }
    }

    /// M3: commit the previous title's pending work before resetting
    /// counters for the new title.
    fn commit_title_rotation(&self, now: u64) -> Option<String> {
        let previous_title = {
            let data = self.data.read().unwrap();
            data.previous_title.clone()
        }?;
        let message = format!("{previous_title} checkpoint: {}", self.checkpoint_count() + 1);

        let result = self.gateway.add_all(&self.worktree_path).and_then(|_| self.gateway.commit(&self.worktree_path, &message));

        let mut data = self.data.write().unwrap();
        let hash = match result {
            Ok(hash) => hash,
            Err(e) => {
                log::warn!("title-rotation commit failed for {}: {e}", self.worktree_path.display());
                None
            }
        };
        // A title rotation commits the previous title's pending work and
        // then starts the new title's count fresh at zero.
        data.checkpoint_count = 0;
        data.last_commit_time = now;
        data.previous_title = None;
        data.state = MonitorState::PendingCheckpoint;
        data.last_event_time = Some(now);
        hash
    }
}

/// Worktree paths excluded from filesystem watching.
pub const WATCH_EXCLUSIONS: &[&str] = &[".git", "node_modules", ".next", "dist", "build"];

/// Whether `path`, relative to a worktree root, falls under an excluded
/// directory.
pub fn is_watch_excluded(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        WATCH_EXCLUSIONS.contains(&name.as_ref())
    })
}

impl Monitor {
    /// Install a recursive filesystem watcher rooted at this Monitor's
    /// worktree, forwarding non-excluded events into `on_fs_event`. On
    /// failure to initialize, marks the watcher absent (M4) and returns the
    /// underlying error for logging; status polling continues regardless.
    pub fn start_watcher(self: &Arc<Self>) -> notify::Result<notify::RecommendedWatcher> {
        let monitor = Arc::clone(self);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else { return };
            if event.paths.iter().any(|p| !is_watch_excluded(p)) {
                monitor.on_fs_event(get_now());
            }
        })?;
        match notify::Watcher::watch(&mut watcher, &self.worktree_path, notify::RecursiveMode::Recursive) {
            Ok(()) => Ok(watcher),
            Err(e) => {
                self.mark_watcher_failed();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{InMemoryExecutor, ScriptedResponse};
    use std::sync::Arc;

    fn monitor_with(timeout_secs: u64) -> (Monitor, Arc<InMemoryExecutor>) {
        let exec = Arc::new(InMemoryExecutor::new());
        let gateway = Gateway::new(exec.clone());
        let path = PathBuf::from("/wt");
        (Monitor::new(path, gateway, Duration::from_secs(timeout_secs)), exec)
    }

    #[test]
    fn starts_idle() {
        let (monitor, _exec) = monitor_with(30);
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.checkpoint_count(), 0);
    }

    #[test]
    fn fs_event_transitions_to_pending() {
        let (monitor, _exec) = monitor_with(30);
        monitor.on_fs_event(100);
        assert_eq!(monitor.state(), MonitorState::PendingCheckpoint);
    }

    #[test]
    fn commits_after_debounce_and_timeout_elapse() {
        let (monitor, exec) = monitor_with(5);
        exec.script(PathBuf::from("/wt"), &["add", "."], ScriptedResponse::ok(""));
        exec.script(PathBuf::from("/wt"), &["commit", "-m", "add retry logic checkpoint: 1"], ScriptedResponse::ok(""));
        exec.script(PathBuf::from("/wt"), &["rev-parse", "HEAD"], ScriptedResponse::ok("abc123\n"));

        monitor.observe_title(Some("add retry logic".to_string()));
        monitor.on_fs_event(0);
        assert_eq!(monitor.tick(1), None, "debounce has not elapsed yet");
        assert_eq!(monitor.tick(6), Some("abc123".to_string()));
        assert_eq!(monitor.checkpoint_count(), 1);
        assert_eq!(monitor.state(), MonitorState::Idle);
    }

    #[test]
    fn no_commit_without_watcher() {
        let (monitor, _exec) = monitor_with(5);
        monitor.mark_watcher_failed();
        monitor.observe_title(Some("x".to_string()));
        monitor.on_fs_event(0);
        assert_eq!(monitor.tick(100), None);
    }

    #[test]
    fn title_rotation_commits_previous_title_first() {
        let (monitor, exec) = monitor_with(5);
        exec.script(PathBuf::from("/wt"), &["add", "."], ScriptedResponse::ok(""));
        exec.script(PathBuf::from("/wt"), &["commit", "-m", "A checkpoint: 1"], ScriptedResponse::ok(""));
        exec.script(PathBuf::from("/wt"), &["rev-parse", "HEAD"], ScriptedResponse::ok("def456\n"));

        monitor.observe_title(Some("A".to_string()));
        monitor.on_fs_event(0);
        monitor.observe_title(Some("B".to_string()));
        assert_eq!(monitor.state(), MonitorState::TitleRotation);

        let hash = monitor.tick(3);
        assert_eq!(hash, Some("def456".to_string()));
        assert_eq!(monitor.checkpoint_count(), 0);
    }

    #[test]
    fn empty_commit_is_treated_as_success_not_failure() {
        let (monitor, exec) = monitor_with(1);
        exec.script(PathBuf::from("/wt"), &["add", "."], ScriptedResponse::ok(""));
        exec.script(
            PathBuf::from("/wt"),
            &["commit", "-m", "x checkpoint: 1"],
            ScriptedResponse::err(1, "nothing to commit, working tree clean"),
        );

        monitor.observe_title(Some("x".to_string()));
        monitor.on_fs_event(0);
        assert_eq!(monitor.tick(2), None);
        assert_eq!(monitor.state(), MonitorState::Idle);
        assert_eq!(monitor.checkpoint_count(), 0);
    }

    #[test]
    fn watch_exclusions_filter_git_and_build_dirs() {
        assert!(is_watch_excluded(Path::new("repo/.git/HEAD")));
        assert!(is_watch_excluded(Path::new("repo/node_modules/pkg/index.js")));
        assert!(!is_watch_excluded(Path::new("repo/src/main.rs")));
    }
}
