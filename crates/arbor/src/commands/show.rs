//! `arbor show`: display one worktree with its repository.

use anyhow::Result;
use libarbor::{Config, WorktreeDetail};
use libarbor::ipc::ShowRequest;

use super::{client, ensure_success, format_time};

/// Print the details of one worktree as key/value lines.
pub fn run(config: &Config, worktree_id: &str) -> Result<()> {
    let req = ShowRequest {
        worktree_id: worktree_id.to_string(),
    };
    let resp = ensure_success(client(config).show(&req)?, "failed to show worktree")?;
    let detail: WorktreeDetail = resp.decode()?;

    let wt = detail.worktree;
    println!("id:         {}", wt.dir_name());
    println!("repository: {}", detail.repository.name);
    println!("path:       {}", wt.path.display());
    println!("status:     {}", wt.state.status_str());
    println!("branch:     {}", wt.state.branch().unwrap_or("-"));
    println!("leased at:  {}", format_time(wt.state.leased_at()));
    println!("created at: {}", wt.created_at.format("%Y-%m-%d %H:%M:%S"));
    Ok(())
}
