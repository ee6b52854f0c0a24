//! The Worktree Lifecycle Manager: the orchestration layer that turns Gateway
//! primitives into repository checkout, worktree creation/deletion, status
//! refresh, renaming, and merged-worktree cleanup.

mod catalog;
mod error;
mod manager;
mod naming;

pub use catalog::{Catalog, Repository, Worktree};
pub use error::LifecycleError;
pub use manager::{ChangeType, DiffEntry, LifecycleManager};
pub use naming::{generate_session_name, is_generated_name, NameAvailability};
