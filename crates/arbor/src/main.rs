//! Command-line interface for the arbor worktree pool daemon.

use std::{path::PathBuf, process};

use anyhow::Result;
use clap::{Parser, Subcommand};
use libarbor::Config;

mod commands;

#[derive(Parser)]
#[command(name = "arbor", author, version, about, long_about = None)]
/// Top-level CLI options for arbor.
struct Cli {
    /// Override the config directory (default: ~/.arbor)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pool daemon in the foreground
    Daemon,

    /// Register a repository and pre-create its worktree pool
    Track {
        /// Unique repository name
        name: String,

        /// Path to the source working copy
        path: PathBuf,

        /// Base branch (auto-detected from the remote HEAD when omitted)
        #[arg(long)]
        branch: Option<String>,

        /// Maximum number of pooled worktrees
        #[arg(long, default_value_t = 8)]
        max: u32,
    },

    /// Stop tracking a repository and delete its pooled worktrees
    Untrack {
        /// Repository name
        name: String,
    },

    /// List tracked repositories
    Repos,

    /// Claim an idle worktree on the given branch
    ///
    /// Prints a JSON object with `worktree_id` and `path` to stdout.
    Claim {
        /// Repository name
        repo: String,

        /// Branch to check out in the claimed worktree
        branch: String,
    },

    /// Return a claimed worktree to the pool
    Release {
        /// Identifier printed by `claim`
        worktree_id: String,
    },

    /// Show pool usage per repository
    Pool {
        /// Restrict to one repository
        #[arg(long)]
        repo: Option<String>,
    },

    /// Show daemon status
    Status,

    /// List all worktrees with their details
    List,

    /// Fetch the source and update idle worktrees for a repository
    Refresh {
        /// Repository name
        repo: String,
    },

    /// Show a single worktree with its repository
    Show {
        /// Worktree identifier or directory name
        worktree_id: String,
    },
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("[ERROR] {err:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = match cli.config_dir {
        Some(dir) => Config::load_from_dir(dir)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Daemon => commands::daemon::run(config),
        Commands::Track {
            name,
            path,
            branch,
            max,
        } => commands::track::run(&config, &name, &path, branch.as_deref(), max),
        Commands::Untrack { name } => commands::untrack::run(&config, &name),
        Commands::Repos => commands::repos::run(&config),
        Commands::Claim { repo, branch } => commands::claim::run(&config, &repo, &branch),
        Commands::Release { worktree_id } => commands::release::run(&config, &worktree_id),
        Commands::Pool { repo } => commands::pool::run(&config, repo.as_deref()),
        Commands::Status => commands::status::run(&config),
        Commands::List => commands::list::run(&config),
        Commands::Refresh { repo } => commands::refresh::run(&config, &repo),
        Commands::Show { worktree_id } => commands::show::run(&config, &worktree_id),
    }
}
