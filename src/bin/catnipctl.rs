//! Thin CLI exercising the Worktree Lifecycle Manager from a terminal.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use catnip_core::config::Config;
use catnip_core::git::{Gateway, ShellExecutor};
use catnip_core::lifecycle::LifecycleManager;
use catnip_core::path::format_path_for_display;
use catnip_core::persistence;
use catnip_core::session::Supervisor;

#[derive(Parser)]
#[command(name = "catnipctl", about = "Manage git worktree-backed coding-agent workspaces")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clone a repository (if needed) and create its initial worktree.
    Checkout {
        org: String,
        repo: String,
        #[arg(long)]
        branch: Option<String>,
    },
    /// Create a new worktree off an existing repository.
    Create {
        repo_id: String,
        source_branch: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// List tracked worktrees.
    List,
    /// Delete a worktree by id.
    Delete { worktree_id: uuid::Uuid },
    /// Delete every worktree whose branch has landed upstream.
    CleanupMerged,
    /// Push a worktree's current branch upstream.
    Push {
        worktree_id: uuid::Uuid,
        #[arg(long, default_value = "origin")]
        remote: String,
        /// Push even if the diff includes `.github/workflows/*` changes.
        #[arg(long)]
        allow_workflow_changes: bool,
    },
    /// Run the background re-scan/checkpoint loop until interrupted.
    Watch,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let workspace_dir = PathBuf::from("workspace");
    let config_path = Config::resolve_path(&workspace_dir);
    let config = Config::load(&config_path)?;

    let gateway = Gateway::new(Arc::new(ShellExecutor::new()));
    let catalog = persistence::load(&persistence::state_path(&config.workspace_dir))
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let manager = Arc::new(LifecycleManager::with_catalog(gateway.clone(), config.clone(), catalog));

    match cli.command {
        Command::Checkout { org, repo, branch } => {
            let repository = manager
                .checkout_repository(&org, &repo, branch.as_deref())
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{} at {}", repository.id, format_path_for_display(&repository.bare_path));
        }
        Command::Create { repo_id, source_branch, name } => {
            let worktree = manager
                .create_worktree(&repo_id, &source_branch, name.as_deref())
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("{} ({}) at {}", worktree.display_name, worktree.id, format_path_for_display(&worktree.path));
        }
        Command::List => {
            for worktree in manager.list_worktrees() {
                println!(
                    "{}\t{}\t{}\t{}",
                    worktree.id,
                    worktree.display_name,
                    worktree.branch,
                    format_path_for_display(&worktree.path)
                );
            }
        }
        Command::Delete { worktree_id } => {
            manager.delete_worktree(worktree_id).map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("deleted {worktree_id}");
        }
        Command::CleanupMerged => {
            for (id, result) in manager.cleanup_merged() {
                match result {
                    Ok(()) => println!("deleted {id}"),
                    Err(e) => eprintln!("failed to delete {id}: {e}"),
                }
            }
        }
        Command::Push { worktree_id, remote, allow_workflow_changes } => {
            manager
                .push_worktree(worktree_id, &remote, allow_workflow_changes)
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
            println!("pushed {worktree_id} to {remote}");
        }
        Command::Watch => {
            let checkpoint_timeout = Duration::from_secs(config.checkpoint_timeout_seconds as u64);
            let supervisor = Supervisor::new(manager.clone(), gateway, checkpoint_timeout);
            supervisor.run();
        }
    }

    persistence::save(manager.catalog(), &persistence::state_path(&config.workspace_dir))
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    Ok(())
}
