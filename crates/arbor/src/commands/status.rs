//! `arbor status`: show daemon-level status.

use anyhow::Result;
use libarbor::{Config, DaemonStatus};

use super::{client, ensure_success, format_time};

/// Print the daemon's status as key/value lines.
pub fn run(config: &Config) -> Result<()> {
    let resp = ensure_success(client(config).daemon_status()?, "failed to get daemon status")?;
    let status: DaemonStatus = resp.decode()?;

    println!("running:         {}", status.running);
    println!("socket:          {}", status.socket_path.display());
    println!("repositories:    {}", status.repositories);
    println!("last reconciler: {}", format_time(status.last_reconciler));
    println!("uptime:          {}", status.uptime);
    Ok(())
}
