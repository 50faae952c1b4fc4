//! `arbor repos`: list tracked repositories.

use anyhow::Result;
use libarbor::{Config, Repository};

use super::{client, ensure_success, format_time, plain_table};

/// Print every tracked repository as a table.
pub fn run(config: &Config) -> Result<()> {
    let resp = ensure_success(client(config).repo_list()?, "failed to list repositories")?;
    let repos: Vec<Repository> = resp.decode()?;

    if repos.is_empty() {
        println!("No repositories tracked");
        return Ok(());
    }

    let mut table = plain_table(vec!["NAME", "PATH", "BASE BRANCH", "MAX", "LAST FETCH"]);
    for repo in repos {
        table.add_row(vec![
            repo.name,
            repo.path.display().to_string(),
            repo.base_branch,
            repo.max_worktrees.to_string(),
            format_time(repo.last_fetch_at),
        ]);
    }
    println!("{table}");
    Ok(())
}
