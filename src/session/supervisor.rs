//! Service supervisor: re-scans the live worktree set and keeps one Monitor
//! per worktree path in sync with it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::git::Gateway;
use crate::lifecycle::LifecycleManager;
use crate::utils::get_now;

use super::monitor::Monitor;
use super::title::PtyTitleStore;

/// Re-scans [`LifecycleManager::list_worktrees`] on a fixed interval,
/// spawning a [`Monitor`] for each newly observed worktree path and
/// dropping the one for any path that vanished.
pub struct Supervisor {
    lifecycle: Arc<LifecycleManager>,
    gateway: Gateway,
    checkpoint_timeout: Duration,
    pty_titles: PtyTitleStore,
    monitors: RwLock<HashMap<PathBuf, MonitorHandle>>,
}

struct MonitorHandle {
    monitor: Arc<Monitor>,
    // Held only to keep the watcher alive for the Monitor's lifetime; never
    // read directly. `None` when the watcher failed to initialize (M4).
    _watcher: Option<notify::RecommendedWatcher>,
}

impl Supervisor {
    pub fn new(lifecycle: Arc<LifecycleManager>, gateway: Gateway, checkpoint_timeout: Duration) -> Self {
        Self {
            lifecycle,
            gateway,
            checkpoint_timeout,
            pty_titles: PtyTitleStore::new(),
            monitors: RwLock::new(HashMap::new()),
        }
    }

    pub fn pty_titles(&self) -> &PtyTitleStore {
        &self.pty_titles
    }

    pub fn monitor_for(&self, path: &PathBuf) -> Option<Arc<Monitor>> {
        self.monitors.read().unwrap().get(path).map(|h| h.monitor.clone())
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.read().unwrap().len()
    }

    /// One supervisory scan: add Monitors for newly observed paths, drop
    /// Monitors whose worktree path no longer exists in the catalog.
    pub fn rescan(&self) {
        let live_paths: Vec<PathBuf> = self.lifecycle.list_worktrees().into_iter().map(|w| w.path).collect();

        let mut monitors = self.monitors.write().unwrap();
        monitors.retain(|path, _| live_paths.contains(path));

        for path in live_paths {
            monitors.entry(path.clone()).or_insert_with(|| {
                let monitor = Arc::new(Monitor::new(path, self.gateway.clone(), self.checkpoint_timeout));
                let watcher = match monitor.start_watcher() {
                    Ok(w) => Some(w),
                    Err(e) => {
                        log::warn!("failed to start filesystem watcher: {e}");
                        None
                    }
                };
                MonitorHandle { monitor, _watcher: watcher }
            });
        }
    }

    /// One full supervisory cycle (§4.3): reconcile Monitors against the
    /// live worktree set, then tick each so any commit that is due actually
    /// fires. `now` is supplied by the caller so tests stay deterministic.
    pub fn run_once(&self, now: u64) {
        self.rescan();
        let monitors: Vec<Arc<Monitor>> = self.monitors.read().unwrap().values().map(|h| h.monitor.clone()).collect();
        for monitor in monitors {
            monitor.tick(now);
        }
    }

    /// Blocking daemon loop: `run_once` every [`RESCAN_INTERVAL`], forever.
    /// Driven by `catnipctl watch`; embedders of the core as a library are
    /// expected to spawn this on a thread of their own rather than call it
    /// from anywhere latency-sensitive.
    pub fn run(&self) {
        loop {
            self.run_once(get_now());
            std::thread::sleep(RESCAN_INTERVAL);
        }
    }
}

/// The supervisor's re-scan cadence (§4.3).
pub const RESCAN_INTERVAL: Duration = Duration::from_secs(30);
