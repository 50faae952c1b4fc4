//! Service configuration: defaults, the optional YAML file, and environment
//! overrides.

use std::{env, fs, path::PathBuf, time::Duration};

use serde::Deserialize;

use crate::error::{ArborError, Result};

/// Environment variable overriding the config directory.
pub const ENV_CONFIG_DIR: &str = "ARBOR_CONFIG_DIR";
/// Environment variable overriding the worktree directory.
pub const ENV_WORKTREE_DIR: &str = "ARBOR_WORKTREE_DIR";
/// Environment variable overriding the daemon socket path.
pub const ENV_SOCKET_PATH: &str = "ARBOR_SOCKET_PATH";

/// File name of the metadata store inside the worktree directory.
const DB_FILE: &str = "arbor.db";
/// File name of the daemon socket inside the worktree directory.
const SOCKET_FILE: &str = "daemon.sock";
/// File name of the optional configuration file inside the config directory.
const CONFIG_FILE: &str = "config.yaml";
/// Reconciliation interval applied when the config file does not set one.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Optional keys read from `config.yaml`.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    /// Humantime duration string, e.g. `"1m"` or `"90s"`.
    reconciliation_interval: Option<String>,
    /// Socket path override.
    socket_path: Option<PathBuf>,
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `config.yaml`; defaults to `$HOME/.arbor`.
    pub config_dir: PathBuf,
    /// Directory holding the store, the socket, and all pooled worktrees.
    pub worktree_dir: PathBuf,
    /// Where the daemon listens.
    pub socket_path: PathBuf,
    /// How often the reconciler wakes up.
    pub reconciliation_interval: Duration,
}

impl Config {
    /// Load configuration from the default location, honoring environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_dir = match env::var_os(ENV_CONFIG_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => home_dir()?.join(".arbor"),
        };
        Self::load_from_dir(config_dir)
    }

    /// Load configuration rooted at an explicit config directory.
    pub fn load_from_dir(config_dir: PathBuf) -> Result<Self> {
        let file = read_file_config(&config_dir.join(CONFIG_FILE))?;

        let worktree_dir = match env::var_os(ENV_WORKTREE_DIR) {
            Some(dir) => PathBuf::from(dir),
            None => config_dir.join("worktrees"),
        };

        let socket_path = match env::var_os(ENV_SOCKET_PATH) {
            Some(path) => PathBuf::from(path),
            None => file
                .socket_path
                .clone()
                .unwrap_or_else(|| worktree_dir.join(SOCKET_FILE)),
        };

        let reconciliation_interval = match &file.reconciliation_interval {
            Some(raw) => humantime::parse_duration(raw).map_err(|err| {
                ArborError::InvalidArgument(format!(
                    "invalid reconciliation_interval '{raw}': {err}"
                ))
            })?,
            None => DEFAULT_INTERVAL,
        };

        Ok(Self {
            config_dir,
            worktree_dir,
            socket_path,
            reconciliation_interval,
        })
    }

    /// Path of the metadata store file.
    pub fn db_path(&self) -> PathBuf {
        self.worktree_dir.join(DB_FILE)
    }

    /// Create the worktree directory if it does not exist yet.
    pub fn ensure_worktree_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.worktree_dir)?;
        Ok(())
    }
}

/// Parse `config.yaml` when present; absence is not an error.
fn read_file_config(path: &std::path::Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }
    let raw = fs::read_to_string(path)?;
    serde_yaml::from_str(&raw).map_err(|err| {
        ArborError::InvalidArgument(format!("failed to parse {}: {err}", path.display()))
    })
}

/// The current user's home directory.
fn home_dir() -> Result<PathBuf> {
    env::var_os("HOME")
        .map(PathBuf::from)
        .ok_or_else(|| ArborError::Internal("HOME is not set".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_without_config_file() {
        let tmp = tempdir().unwrap();
        let config_dir = tmp.path().join("conf");
        let config = Config::load_from_dir(config_dir.clone()).unwrap();

        assert_eq!(config.worktree_dir, config_dir.join("worktrees"));
        assert_eq!(config.socket_path, config.worktree_dir.join("daemon.sock"));
        assert_eq!(config.reconciliation_interval, Duration::from_secs(60));
        assert_eq!(config.db_path(), config.worktree_dir.join("arbor.db"));
    }

    #[test]
    fn config_file_overrides_interval_and_socket() {
        let tmp = tempdir().unwrap();
        let config_dir = tmp.path().to_path_buf();
        fs::write(
            config_dir.join("config.yaml"),
            "reconciliation_interval: 90s\nsocket_path: /tmp/custom.sock\n",
        )
        .unwrap();

        let config = Config::load_from_dir(config_dir).unwrap();
        assert_eq!(config.reconciliation_interval, Duration::from_secs(90));
        assert_eq!(config.socket_path, PathBuf::from("/tmp/custom.sock"));
    }

    #[test]
    fn malformed_interval_is_rejected() {
        let tmp = tempdir().unwrap();
        let config_dir = tmp.path().to_path_buf();
        fs::write(
            config_dir.join("config.yaml"),
            "reconciliation_interval: soon\n",
        )
        .unwrap();

        let err = Config::load_from_dir(config_dir).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
