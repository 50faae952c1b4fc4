//! `arbor release`: return a claimed worktree to the pool.

use anyhow::Result;
use libarbor::Config;
use libarbor::ipc::ReleaseRequest;

use super::{client, ensure_success};

/// Release the worktree identified by `worktree_id`.
pub fn run(config: &Config, worktree_id: &str) -> Result<()> {
    let req = ReleaseRequest {
        worktree_id: worktree_id.to_string(),
    };
    ensure_success(client(config).release(&req)?, "failed to release worktree")?;
    println!("Worktree '{worktree_id}' returned to pool");
    Ok(())
}
