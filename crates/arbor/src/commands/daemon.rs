//! `arbor daemon`: run the pool service in the foreground.

use anyhow::Result;
use libarbor::{Config, Daemon};
use tracing_subscriber::EnvFilter;

/// Run the daemon until SIGINT or SIGTERM.
pub fn run(config: Config) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    Daemon::new(config)?.run()?;
    Ok(())
}
