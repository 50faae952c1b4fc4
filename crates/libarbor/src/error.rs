use std::{io, result::Result as StdResult};
use thiserror::Error;

/// Custom Result type for arbor operations.
pub type Result<T> = StdResult<T, ArborError>;

/// Errors surfaced by the pool service and its components.
#[derive(Error, Debug)]
pub enum ArborError {
    /// The named repository is not registered.
    #[error("repository '{0}' does not exist")]
    RepoNotFound(String),

    /// No worktree record matches the given identifier.
    #[error("worktree '{0}' does not exist")]
    WorktreeNotFound(String),

    /// A repository with the same name is already registered.
    #[error("repository '{0}' already exists")]
    AlreadyExists(String),

    /// The caller supplied something unusable: a bad branch name, a path
    /// that is not a working copy, an undetectable base branch.
    #[error("{0}")]
    InvalidArgument(String),

    /// Every worktree is claimed and the pool is at capacity.
    #[error("no idle worktrees available and pool is at capacity")]
    PoolExhausted,

    /// The requested branch is already checked out in another worktree of
    /// the same repository.
    #[error("branch '{0}' is already in use by another worktree in this repository")]
    BranchInUse(String),

    /// Repository removal refused while leases are outstanding.
    #[error("cannot remove repository with {count} worktree(s) in use")]
    InUseRefused {
        /// Number of worktrees currently leased.
        count: usize,
    },

    /// A git subprocess exited non-zero; the message carries its stderr.
    #[error("{0}")]
    Driver(String),

    /// Release could not recondition the worktree; the record is parked as
    /// corrupt until the reconciler collects it.
    #[error("worktree cleanup failed: {0}")]
    CleanupFailed(String),

    /// The metadata store misbehaved.
    #[error("store error: {0}")]
    Store(String),

    /// An underlying I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Anything else unexpected.
    #[error("{0}")]
    Internal(String),
}

impl ArborError {
    /// Stable machine-readable tag for this error, carried over IPC.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepoNotFound(_) | Self::WorktreeNotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::PoolExhausted => "pool_exhausted",
            Self::BranchInUse(_) => "branch_in_use",
            Self::InUseRefused { .. } => "in_use_refused",
            Self::Driver(_) => "driver_error",
            Self::CleanupFailed(_) => "cleanup_failed",
            Self::Store(_) | Self::Io(_) | Self::Internal(_) => "internal",
        }
    }

    /// Render the error as it travels in an IPC response: `<kind>: <detail>`.
    pub fn wire_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

impl From<rusqlite::Error> for ArborError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store(err.to_string())
    }
}
