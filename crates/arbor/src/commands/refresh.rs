//! `arbor refresh`: fetch a source and update its idle worktrees.

use anyhow::Result;
use libarbor::Config;
use libarbor::ipc::{RefreshRequest, RefreshResponse};

use super::{client, ensure_success};

/// Refresh `repo`: fetch, collect corrupt worktrees, restore capacity, and
/// point idle worktrees at the new base tip.
pub fn run(config: &Config, repo: &str) -> Result<()> {
    let req = RefreshRequest {
        repo_name: repo.to_string(),
    };
    let resp = ensure_success(client(config).refresh(&req)?, "failed to refresh repository")?;
    let refresh: RefreshResponse = resp.decode()?;

    println!(
        "Refreshed '{}': {} worktree(s) updated, {} cleaned",
        refresh.repository, refresh.worktrees_updated, refresh.worktrees_cleaned
    );
    Ok(())
}
