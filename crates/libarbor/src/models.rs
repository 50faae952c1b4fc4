use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArborError, Result};

/// A registered source repository and the policy for its worktree pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Stable identity of the registration.
    pub id: Uuid,
    /// Unique human-readable name, used in CLI commands and directory paths.
    pub name: String,
    /// Absolute path to the non-bare source working copy.
    pub path: PathBuf,
    /// Target pool capacity; the reconciler keeps this many worktrees warm.
    pub max_worktrees: u32,
    /// Branch whose tip idle worktrees are kept pointed at.
    pub base_branch: String,
    /// When the source was last fetched by an explicit refresh, if ever.
    pub last_fetch_at: Option<DateTime<Utc>>,
    /// When the repository was registered.
    pub created_at: DateTime<Utc>,
}

impl Repository {
    /// Build a new registration record with a fresh identity.
    pub fn new(name: &str, path: PathBuf, base_branch: &str, max_worktrees: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            path,
            max_worktrees,
            base_branch: base_branch.to_string(),
            last_fetch_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle state of a pooled worktree.
///
/// The lease timestamp and claimed branch only exist while the worktree is
/// checked out to a consumer, so they live inside the `InUse` variant rather
/// than as independent nullable fields. The store flattens this back into
/// nullable columns at its boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum WorktreeState {
    /// Parked in the pool, detached at the base branch tip.
    Idle,
    /// Leased to a consumer and checked out on a real branch.
    InUse {
        /// When the lease started.
        leased_at: DateTime<Utc>,
        /// Branch the consumer claimed.
        branch: String,
    },
    /// Reconditioning failed; awaiting collection by the reconciler.
    Corrupt,
}

impl WorktreeState {
    /// The status column value for this state.
    pub fn status_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InUse { .. } => "in-use",
            Self::Corrupt => "corrupt",
        }
    }

    /// Whether the worktree is parked and claimable.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Whether the worktree is currently leased.
    pub fn is_in_use(&self) -> bool {
        matches!(self, Self::InUse { .. })
    }

    /// Whether the worktree is awaiting garbage collection.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt)
    }

    /// The claimed branch, when leased.
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::InUse { branch, .. } => Some(branch),
            _ => None,
        }
    }

    /// The lease start, when leased.
    pub fn leased_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::InUse { leased_at, .. } => Some(*leased_at),
            _ => None,
        }
    }

    /// Split the state into the `(status, leased_at, branch)` column triple.
    pub fn to_columns(&self) -> (&'static str, Option<DateTime<Utc>>, Option<&str>) {
        match self {
            Self::Idle => ("idle", None, None),
            Self::InUse { leased_at, branch } => ("in-use", Some(*leased_at), Some(branch)),
            Self::Corrupt => ("corrupt", None, None),
        }
    }

    /// Rebuild the state from its column triple, rejecting the shapes the
    /// type makes unrepresentable (a lease without a branch, a branch on an
    /// idle worktree).
    pub fn from_columns(
        status: &str,
        leased_at: Option<DateTime<Utc>>,
        branch: Option<String>,
    ) -> Result<Self> {
        match (status, leased_at, branch) {
            ("idle", None, None) => Ok(Self::Idle),
            ("corrupt", None, None) => Ok(Self::Corrupt),
            ("in-use", Some(leased_at), Some(branch)) => Ok(Self::InUse { leased_at, branch }),
            (status, leased_at, branch) => Err(ArborError::Internal(format!(
                "inconsistent worktree record: status={status} leased_at={leased_at:?} branch={branch:?}"
            ))),
        }
    }
}

/// A pooled working directory owned by one repository.
///
/// The UUID doubles as the on-disk directory name, so record identity and
/// directory identity are the same string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worktree {
    /// Stable identity; also the final path component.
    pub id: Uuid,
    /// Owning repository.
    pub repo_id: Uuid,
    /// Absolute path of the working directory.
    pub path: PathBuf,
    /// Current lifecycle state.
    #[serde(flatten)]
    pub state: WorktreeState,
    /// When the directory was created.
    pub created_at: DateTime<Utc>,
}

impl Worktree {
    /// Build a fresh idle record for a directory that was just created.
    pub fn new(id: Uuid, repo_id: Uuid, path: PathBuf) -> Self {
        Self {
            id,
            repo_id,
            path,
            state: WorktreeState::Idle,
            created_at: Utc::now(),
        }
    }

    /// The on-disk directory name (the UUID rendered as a string).
    pub fn dir_name(&self) -> String {
        self.id.to_string()
    }
}

/// Per-repository pool counters for status queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Repository name.
    pub repo_name: String,
    /// All worktrees regardless of state.
    pub total: u32,
    /// Worktrees currently leased.
    pub in_use: u32,
    /// Worktrees parked and claimable.
    pub idle: u32,
    /// Target capacity.
    pub max: u32,
    /// When the source was last fetched, if ever.
    pub last_fetch: Option<DateTime<Utc>>,
}

/// One reconciliation pass over every repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcilerRun {
    /// Run identity.
    pub id: Uuid,
    /// When the pass started.
    pub run_at: DateTime<Utc>,
    /// Worktrees created to restore capacity.
    pub created: u32,
    /// Corrupt worktrees removed.
    pub cleaned: u32,
}

impl ReconcilerRun {
    /// Start a new run record with zeroed counters.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            run_at: Utc::now(),
            created: 0,
            cleaned: 0,
        }
    }
}

impl Default for ReconcilerRun {
    fn default() -> Self {
        Self::new()
    }
}

/// A worktree joined with its owning repository, for presentation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeDetail {
    /// The worktree record.
    pub worktree: Worktree,
    /// Its owning repository.
    pub repository: Repository,
}

/// Daemon-level status reported over IPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Always true when a daemon answered.
    pub running: bool,
    /// The socket the daemon is serving on.
    pub socket_path: PathBuf,
    /// When the reconciler last completed a pass, if ever.
    pub last_reconciler: Option<DateTime<Utc>>,
    /// Number of registered repositories.
    pub repositories: usize,
    /// Humanized time since the daemon started.
    pub uptime: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_worktree_starts_idle() {
        let repo_id = Uuid::new_v4();
        let id = Uuid::new_v4();
        let wt = Worktree::new(id, repo_id, PathBuf::from("/tmp/x"));
        assert!(wt.state.is_idle());
        assert_eq!(wt.dir_name(), id.to_string());
    }

    #[test]
    fn state_column_round_trip() {
        let states = [
            WorktreeState::Idle,
            WorktreeState::Corrupt,
            WorktreeState::InUse {
                leased_at: Utc::now(),
                branch: "feat-1".to_string(),
            },
        ];
        for state in states {
            let (status, leased_at, branch) = state.to_columns();
            let back =
                WorktreeState::from_columns(status, leased_at, branch.map(String::from)).unwrap();
            assert_eq!(back, state);
        }
    }

    #[test]
    fn inconsistent_columns_are_rejected() {
        assert!(WorktreeState::from_columns("idle", None, Some("b".into())).is_err());
        assert!(WorktreeState::from_columns("in-use", None, Some("b".into())).is_err());
        assert!(WorktreeState::from_columns("in-use", Some(Utc::now()), None).is_err());
        assert!(WorktreeState::from_columns("bogus", None, None).is_err());
    }

    #[test]
    fn in_use_serializes_with_flattened_lease_fields() {
        let wt = Worktree {
            id: Uuid::new_v4(),
            repo_id: Uuid::new_v4(),
            path: PathBuf::from("/tmp/x"),
            state: WorktreeState::InUse {
                leased_at: Utc::now(),
                branch: "feat-1".to_string(),
            },
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&wt).unwrap();
        assert_eq!(value["status"], "in-use");
        assert_eq!(value["branch"], "feat-1");
        assert!(value["leased_at"].is_string());

        let back: Worktree = serde_json::from_value(value).unwrap();
        assert_eq!(back, wt);
    }

    #[test]
    fn idle_serializes_without_lease_fields() {
        let wt = Worktree::new(Uuid::new_v4(), Uuid::new_v4(), PathBuf::from("/tmp/x"));
        let value = serde_json::to_value(&wt).unwrap();
        assert_eq!(value["status"], "idle");
        assert!(value.get("branch").is_none());
        assert!(value.get("leased_at").is_none());
    }
}
