//! Stateless primitives over a single worktree.
//!
//! The allocator bridges the git driver and the worktree records: it creates
//! directories, reconditions them, and computes state transitions, but never
//! persists anything. The pool engine persists the returned snapshots under
//! its mutex.

use std::{fs, path::PathBuf};

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{ArborError, Result},
    git,
    models::{Repository, Worktree, WorktreeState},
};

/// Per-worktree create/clean/claim/release/update/delete primitives.
pub struct Allocator {
    worktree_root: PathBuf,
}

impl Allocator {
    /// Build an allocator rooted at the directory that holds every pool.
    pub fn new(worktree_root: PathBuf) -> Self {
        Self { worktree_root }
    }

    /// Create a fresh worktree for `repo`, detached at the base branch tip,
    /// and return its idle record.
    pub fn create(&self, repo: &Repository) -> Result<Worktree> {
        let id = Uuid::new_v4();
        let repo_dir = self.worktree_root.join(&repo.name);
        fs::create_dir_all(&repo_dir)?;

        let path = repo_dir.join(id.to_string());
        git::create_worktree(&repo.path, &path, &repo.base_branch)?;

        info!("created worktree {id} for '{}'", repo.name);
        Ok(Worktree::new(id, repo.id, path))
    }

    /// Discard every local modification in the worktree.
    pub fn clean(&self, wt: &Worktree) -> Result<()> {
        git::reset_clean(&wt.path)
    }

    /// Transition an idle worktree onto `branch` for a consumer.
    ///
    /// Fetching first is best-effort: a claim must still succeed when the
    /// remote is unreachable, it just sees older refs.
    pub fn claim(&self, mut wt: Worktree, branch: &str) -> Result<Worktree> {
        if !wt.state.is_idle() {
            return Err(ArborError::InvalidArgument(format!(
                "worktree {} is not idle",
                wt.id
            )));
        }

        if let Err(err) = git::fetch_origin(&wt.path) {
            warn!("fetch before checkout failed for {}: {err}", wt.id);
        }

        git::checkout_branch(&wt.path, branch)?;

        wt.state = WorktreeState::InUse {
            leased_at: Utc::now(),
            branch: branch.to_string(),
        };
        info!("claimed worktree {} on branch '{branch}'", wt.id);
        Ok(wt)
    }

    /// Recondition a leased worktree and park it back in the pool.
    ///
    /// A failed clean makes the directory unusable for the next consumer, so
    /// the snapshot comes back corrupt inside a `cleanup_failed` error. A
    /// failed detach after a successful clean is only a warning.
    pub fn release(&self, mut wt: Worktree, repo: &Repository) -> Result<Worktree> {
        if !wt.state.is_in_use() {
            return Err(ArborError::InvalidArgument(format!(
                "worktree {} is not in use",
                wt.id
            )));
        }

        if let Err(err) = self.clean(&wt) {
            return Err(ArborError::CleanupFailed(err.to_string()));
        }

        let base_ref = format!("origin/{}", repo.base_branch);
        if let Err(err) = git::detach_to(&wt.path, &base_ref) {
            warn!("failed to detach worktree {} at {base_ref}: {err}", wt.id);
        }

        wt.state = WorktreeState::Idle;
        Ok(wt)
    }

    /// Point an idle worktree at the latest `origin/<base_branch>` commit,
    /// staying detached.
    pub fn update(&self, repo: &Repository, wt: &Worktree) -> Result<()> {
        self.clean(wt)?;
        let commit = git::resolve_remote(&repo.path, &repo.base_branch)?;
        git::hard_reset_to(&wt.path, &commit)?;
        info!("updated worktree {} to {}", wt.id, &commit[..commit.len().min(7)]);
        Ok(())
    }

    /// Remove the worktree directory and its bookkeeping in the source
    /// repository.
    pub fn delete(&self, repo: &Repository, wt: &Worktree) -> Result<()> {
        git::remove_worktree(&repo.path, &wt.path)
    }
}
