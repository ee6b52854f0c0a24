//! Worktree orchestration core for a multi-tenant coding-agent workspace manager.
//!
//! Users check out Git repositories and spawn isolated worktrees, each bound to a
//! named branch, with a coding agent or interactive shell running inside. This
//! crate keeps worktree metadata consistent with on-disk Git state under
//! concurrent mutation, detects agent session activity, produces checkpoint
//! commits at quiescence, and prunes worktrees whose branches have landed
//! upstream.
//!
//! The library API is not stable.

pub mod conflict;
pub mod config;
pub mod git;
pub mod lifecycle;
pub mod path;
pub mod persistence;
pub mod session;
pub mod utils;

pub use config::Config;
pub use lifecycle::{LifecycleManager, Repository, Worktree};
