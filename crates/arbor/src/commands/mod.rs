//! One module per CLI subcommand.

pub mod claim;
pub mod daemon;
pub mod list;
pub mod pool;
pub mod refresh;
pub mod release;
pub mod repos;
pub mod show;
pub mod status;
pub mod track;
pub mod untrack;

use anyhow::{Result, bail};
use libarbor::{Config, ipc::{Client, Response}};

/// Client for the daemon configured by `config`.
pub fn client(config: &Config) -> Client {
    Client::new(config.socket_path.clone())
}

/// Fail with the daemon-reported error unless the response succeeded.
pub fn ensure_success(resp: Response, context: &str) -> Result<Response> {
    if !resp.success {
        let error = resp.error.unwrap_or_else(|| "unknown error".to_string());
        bail!("{context}: {error}");
    }
    Ok(resp)
}

/// A timestamp for table display, or `never`.
pub fn format_time(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    match at {
        Some(at) => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => "never".to_string(),
    }
}

/// Bare table without borders for command output.
pub fn plain_table(header: Vec<&str>) -> comfy_table::Table {
    use comfy_table::{ContentArrangement, Table, presets};

    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}
