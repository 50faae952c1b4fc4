//! `arbor list`: list every worktree with its repository.

use anyhow::Result;
use libarbor::{Config, WorktreeDetail};

use super::{client, ensure_success, plain_table};

/// Print all worktrees, claimed ones first.
pub fn run(config: &Config) -> Result<()> {
    let resp = ensure_success(client(config).worktree_list()?, "failed to list worktrees")?;
    let details: Vec<WorktreeDetail> = resp.decode()?;

    if details.is_empty() {
        println!("No worktrees in pool");
        return Ok(());
    }

    let mut table = plain_table(vec!["ID", "REPO", "STATUS", "BRANCH", "CREATED"]);
    for detail in details {
        let wt = detail.worktree;
        table.add_row(vec![
            wt.dir_name(),
            detail.repository.name,
            wt.state.status_str().to_uppercase(),
            wt.state.branch().unwrap_or("-").to_string(),
            wt.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
