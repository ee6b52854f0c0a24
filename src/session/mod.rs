//! Per-Worktree Session Monitor: filesystem churn and agent-session title
//! transitions drive checkpoint commits at quiescence.

pub mod monitor;
pub mod supervisor;
pub mod title;

pub use monitor::{Monitor, MonitorState};
pub use supervisor::Supervisor;
pub use title::{PtyTitleStore, SessionService};
