//! Session-title detection: three prioritized sources, highest first.
//!
//! (1) a title pushed in-memory by the PTY interceptor, (2) an active
//! session object registered with the session service, (3) a best-effort
//! parse of the newest agent-produced JSONL transcript named by UUID. The
//! JSONL path is explicitly best-effort: any I/O or JSON error on it is
//! swallowed and treated as "no title available", never propagated, since a
//! transcript file can legitimately disappear mid-parse.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;

/// Process-wide PTY-pushed title store, keyed by worktree path. The only
/// piece of per-worktree Monitor state that is process-wide rather than
/// owned by the Monitor itself.
#[derive(Clone, Default)]
pub struct PtyTitleStore {
    titles: Arc<DashMap<PathBuf, String>>,
}

impl PtyTitleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_title(&self, work_dir: &Path, title: impl Into<String>) {
        self.titles.insert(work_dir.to_path_buf(), title.into());
    }

    pub fn get_title(&self, work_dir: &Path) -> Option<String> {
        self.titles.get(work_dir).map(|v| v.clone())
    }

    pub fn clear(&self, work_dir: &Path) {
        self.titles.remove(work_dir);
    }
}

/// The session-service collaborator the Monitor consumes (§6): a registered
/// active session carries its own title, independent of the PTY store.
pub trait SessionService {
    fn get_active_session_title(&self, work_dir: &Path) -> Option<String>;
}

#[derive(Debug, Deserialize)]
struct TranscriptRecord {
    #[serde(rename = "type")]
    record_type: String,
    summary: Option<String>,
}

/// Best-effort parse of the newest UUID-named `*.jsonl` transcript under
/// `transcript_dir`: the last `{"type":"summary","summary":"…"}` record is
/// the title. Any I/O or parse failure yields `None` rather than an error.
fn parse_newest_transcript_title(transcript_dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(transcript_dir).ok()?;

    let newest = entries
        .filter_map(|e| e.ok())
        .filter(|e| is_uuid_jsonl(&e.file_name().to_string_lossy()))
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)?;

    let contents = std::fs::read_to_string(&newest).ok()?;
    contents
        .lines()
        .rev()
        .find_map(|line| {
            let record: TranscriptRecord = serde_json::from_str(line).ok()?;
            if record.record_type == "summary" {
                record.summary
            } else {
                None
            }
        })
}

fn is_uuid_jsonl(file_name: &str) -> bool {
    let Some(stem) = file_name.strip_suffix(".jsonl") else {
        return false;
    };
    Uuid::parse_str(stem).is_ok()
}

use uuid::Uuid;

/// Resolve the current title for `work_dir` by trying each source in
/// priority order.
pub fn resolve_title(
    work_dir: &Path,
    pty_store: &PtyTitleStore,
    session_service: Option<&dyn SessionService>,
    transcript_dir: Option<&Path>,
) -> Option<String> {
    if let Some(title) = pty_store.get_title(work_dir) {
        return Some(title);
    }
    if let Some(service) = session_service
        && let Some(title) = service.get_active_session_title(work_dir)
    {
        return Some(title);
    }
    transcript_dir.and_then(parse_newest_transcript_title)
}
