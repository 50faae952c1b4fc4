//! `arbor claim`: claim a worktree and print where it lives.

use anyhow::Result;
use libarbor::ipc::{ClaimRequest, ClaimResponse};
use libarbor::{Config, validate_branch_name};

use super::{client, ensure_success};

/// Claim an idle worktree of `repo` on `branch`.
///
/// On success the only stdout output is a JSON object with `worktree_id`
/// and `path`, so scripts can pipe it straight into `jq`.
pub fn run(config: &Config, repo: &str, branch: &str) -> Result<()> {
    validate_branch_name(branch)?;

    let req = ClaimRequest {
        repo_name: repo.to_string(),
        branch: branch.to_string(),
    };
    let resp = ensure_success(client(config).claim(&req)?, "failed to claim worktree")?;
    let claim: ClaimResponse = resp.decode()?;

    println!("{}", serde_json::to_string_pretty(&claim)?);
    Ok(())
}
