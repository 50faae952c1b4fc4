//! The pool engine: the only component that moves worktrees between states.
//!
//! Every mutating operation runs under one process-wide mutex, held across
//! the git subprocesses it spawns. That is deliberate: the invariants tie
//! store records to on-disk state, and the target concurrency (tens of
//! claims per second) does not justify anything finer-grained.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{error, info, warn};

use crate::{
    allocator::Allocator,
    error::{ArborError, Result},
    git,
    models::{PoolStatus, Repository, Worktree, WorktreeState},
    store::Store,
};

/// Coordinator for every worktree pool.
pub struct Pool {
    store: Arc<Store>,
    allocator: Allocator,
    gate: Mutex<()>,
}

impl Pool {
    /// Build the engine over a shared store and an allocator.
    pub fn new(store: Arc<Store>, allocator: Allocator) -> Self {
        Self {
            store,
            allocator,
            gate: Mutex::new(()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim an idle worktree of `repo_name` for `branch`.
    ///
    /// Creates a worktree on demand when the pool is under capacity; fails
    /// with `pool_exhausted` when it is not, and with `branch_in_use` when
    /// another lease in the same repository already holds the branch.
    pub fn claim(&self, repo_name: &str, branch: &str) -> Result<Worktree> {
        let _gate = self.lock();

        let repo = self.store.repository_by_name(repo_name)?;

        if self.store.branch_in_use(repo.id, branch)? {
            return Err(ArborError::BranchInUse(branch.to_string()));
        }

        let mut idle = self.store.idle_worktrees_by_repo(repo.id)?;
        if idle.is_empty() {
            let counts = self.store.count_by_status(repo.id)?;
            if counts.non_corrupt() >= repo.max_worktrees {
                return Err(ArborError::PoolExhausted);
            }
            info!("no idle worktrees for '{repo_name}', creating one on demand");
            self.create_one(&repo)?;
            idle = self.store.idle_worktrees_by_repo(repo.id)?;
        }

        let Some(candidate) = idle.into_iter().next() else {
            return Err(ArborError::Internal(
                "freshly created worktree disappeared from the pool".to_string(),
            ));
        };

        let claimed = self.allocator.claim(candidate, branch)?;
        self.store.set_worktree_state(claimed.id, &claimed.state)?;
        Ok(claimed)
    }

    /// Return a leased worktree to the pool.
    ///
    /// `id` is the worktree UUID, which is also its directory name. When
    /// reconditioning fails the record is parked as corrupt and the error is
    /// surfaced; the reconciler collects it on its next pass.
    pub fn release(&self, id: &str) -> Result<()> {
        let _gate = self.lock();

        let wt = self.store.worktree(id)?;
        let repo = self.store.repository_by_id(wt.repo_id)?;
        let wt_id = wt.id;

        info!("releasing worktree {wt_id}");
        match self.allocator.release(wt, &repo) {
            Ok(released) => {
                self.store.set_worktree_state(wt_id, &released.state)?;
                info!("worktree {wt_id} returned to pool");
                Ok(())
            }
            Err(err @ ArborError::CleanupFailed(_)) => {
                self.store
                    .set_worktree_state(wt_id, &WorktreeState::Corrupt)?;
                warn!("worktree {wt_id} marked corrupt, scheduling replacement");
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Pool counters per repository; `None` reports every repository.
    pub fn pool_status(&self, repo_name: Option<&str>) -> Result<Vec<PoolStatus>> {
        let _gate = self.lock();

        let repos = match repo_name {
            Some(name) => vec![self.store.repository_by_name(name)?],
            None => self.store.list_repositories()?,
        };

        let mut statuses = Vec::with_capacity(repos.len());
        for repo in repos {
            let counts = self.store.count_by_status(repo.id)?;
            statuses.push(PoolStatus {
                repo_name: repo.name,
                total: counts.total(),
                in_use: counts.in_use,
                idle: counts.idle,
                max: repo.max_worktrees,
                last_fetch: repo.last_fetch_at,
            });
        }
        Ok(statuses)
    }

    /// Populate a freshly registered repository with up to `count` worktrees,
    /// never exceeding its capacity. Individual failures are logged, not
    /// propagated: a partially filled pool is still a working pool.
    pub fn create_initial(&self, repo: &Repository, count: u32) {
        let _gate = self.lock();

        let mut created = 0;
        for _ in 0..count.min(repo.max_worktrees) {
            match self.create_one(repo) {
                Ok(_) => created += 1,
                Err(err) => error!("failed to create initial worktree for '{}': {err}", repo.name),
            }
        }
        if created > 0 {
            info!("created {created} initial worktree(s) for '{}'", repo.name);
        }
    }

    /// Bring one repository's pool back into conformance: collect corrupt
    /// entries, then restore capacity. With `fetch` set (explicit refresh
    /// only) the source is fetched and every idle worktree is re-pointed at
    /// the new `origin/<base_branch>` tip.
    ///
    /// Returns `(created, cleaned)` counters.
    pub fn reconcile(&self, repo: &Repository, fetch: bool) -> Result<(u32, u32)> {
        let _gate = self.lock();

        let mut created = 0;
        let mut cleaned = 0;

        let worktrees = self.store.worktrees_by_repo(repo.id)?;
        for wt in worktrees.iter().filter(|wt| wt.state.is_corrupt()) {
            match self.allocator.delete(repo, wt) {
                Ok(()) => {
                    self.store.delete_worktree(wt.id)?;
                    cleaned += 1;
                }
                Err(err) => error!("failed to delete corrupt worktree {}: {err}", wt.id),
            }
        }

        let current = worktrees.len() as u32 - cleaned;
        for _ in current..repo.max_worktrees {
            match self.create_one(repo) {
                Ok(_) => created += 1,
                Err(err) => error!("failed to create worktree for '{}': {err}", repo.name),
            }
        }

        if fetch {
            self.refresh_idle(repo);
        }

        Ok((created, cleaned))
    }

    /// Fetch the source and update every idle worktree, best-effort.
    fn refresh_idle(&self, repo: &Repository) {
        info!("fetching updates for repository '{}'", repo.name);
        if let Err(err) = git::fetch(&repo.path) {
            error!("failed to fetch repository '{}': {err}", repo.name);
            return;
        }
        if let Err(err) = self.store.set_last_fetch(&repo.name, chrono::Utc::now()) {
            error!("failed to record fetch time for '{}': {err}", repo.name);
        }

        match self.store.idle_worktrees_by_repo(repo.id) {
            Ok(idle) => {
                for wt in idle {
                    if let Err(err) = self.allocator.update(repo, &wt) {
                        error!("failed to update worktree {}: {err}", wt.id);
                    }
                }
            }
            Err(err) => error!("failed to list idle worktrees for '{}': {err}", repo.name),
        }
    }

    fn create_one(&self, repo: &Repository) -> Result<Worktree> {
        let wt = self.allocator.create(repo)?;
        self.store.insert_worktree(&wt)?;
        Ok(wt)
    }
}
