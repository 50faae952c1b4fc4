//! `arbor pool`: show pool usage per repository.

use anyhow::Result;
use libarbor::ipc::PoolStatusRequest;
use libarbor::{Config, PoolStatus};

use super::{client, ensure_success, format_time, plain_table};

/// Print pool counters, optionally restricted to one repository.
pub fn run(config: &Config, repo: Option<&str>) -> Result<()> {
    let req = PoolStatusRequest {
        repo_name: repo.map(str::to_string),
    };
    let resp = ensure_success(client(config).pool_status(&req)?, "failed to get pool status")?;
    let statuses: Vec<PoolStatus> = resp.decode()?;

    if statuses.is_empty() {
        println!("No repositories in pool");
        return Ok(());
    }

    let mut table = plain_table(vec!["REPO", "TOTAL", "IN-USE", "IDLE", "MAX", "LAST FETCH"]);
    for status in statuses {
        table.add_row(vec![
            status.repo_name,
            status.total.to_string(),
            status.in_use.to_string(),
            status.idle.to_string(),
            status.max.to_string(),
            format_time(status.last_fetch),
        ]);
    }
    println!("{table}");
    Ok(())
}
