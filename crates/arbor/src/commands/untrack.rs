//! `arbor untrack`: unregister a repository and delete its pool.

use anyhow::Result;
use libarbor::Config;

use super::{client, ensure_success};

/// Unregister `name`, refusing while any of its worktrees is claimed.
pub fn run(config: &Config, name: &str) -> Result<()> {
    ensure_success(
        client(config).repo_remove(name)?,
        "failed to untrack repository",
    )?;
    println!("Repository '{name}' untracked");
    Ok(())
}
