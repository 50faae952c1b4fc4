//! `arbor track`: register a repository with the daemon.

use std::path::Path;

use anyhow::Result;
use libarbor::ipc::RepoAddRequest;
use libarbor::{Config, Repository};

use super::{client, ensure_success};

/// Register `name` at `path` and populate its pool.
pub fn run(
    config: &Config,
    name: &str,
    path: &Path,
    branch: Option<&str>,
    max: u32,
) -> Result<()> {
    let req = RepoAddRequest {
        name: name.to_string(),
        path: path.to_string_lossy().into_owned(),
        max_worktrees: max,
        base_branch: branch.unwrap_or_default().to_string(),
    };

    let resp = ensure_success(client(config).repo_add(&req)?, "failed to track repository")?;
    let repo: Repository = resp.decode()?;

    println!(
        "Tracking '{}' (base branch {}, capacity {})",
        repo.name, repo.base_branch, repo.max_worktrees
    );
    Ok(())
}
