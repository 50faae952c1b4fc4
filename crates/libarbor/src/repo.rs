//! Repository registration and removal.

use std::{fs, path::Path, sync::Arc};

use tracing::{error, info, warn};

use crate::{
    error::{ArborError, Result},
    git,
    models::Repository,
    store::Store,
};

/// Registers and unregisters source repositories.
pub struct RepoManager {
    store: Arc<Store>,
}

impl RepoManager {
    /// Build a manager over the shared store.
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Register a repository: validate the source, settle the base branch,
    /// and persist the record. The caller is responsible for populating the
    /// pool afterwards.
    ///
    /// An empty `base_branch` asks for auto-detection from the remote HEAD.
    pub fn add(
        &self,
        name: &str,
        path: &Path,
        base_branch: &str,
        max_worktrees: u32,
    ) -> Result<Repository> {
        if name.is_empty() {
            return Err(ArborError::InvalidArgument(
                "repository name cannot be empty".to_string(),
            ));
        }
        if max_worktrees == 0 {
            return Err(ArborError::InvalidArgument(
                "max_worktrees must be at least 1".to_string(),
            ));
        }

        let abs_path = fs::canonicalize(path).map_err(|_| {
            ArborError::InvalidArgument(format!("path does not exist: {}", path.display()))
        })?;

        git::validate_repo(&abs_path)?;

        let base_branch = if base_branch.is_empty() {
            let detected = git::default_branch(&abs_path)?;
            info!("auto-detected base branch: {detected}");
            detected
        } else {
            base_branch.to_string()
        };
        git::validate_branch(&abs_path, &base_branch)?;

        if self.store.repository_by_name(name).is_ok() {
            return Err(ArborError::AlreadyExists(name.to_string()));
        }

        let repo = Repository::new(name, abs_path, &base_branch, max_worktrees);
        self.store.insert_repository(&repo)?;

        info!(
            "added repository '{name}' at {} (base branch {base_branch}, capacity {max_worktrees})",
            repo.path.display()
        );
        Ok(repo)
    }

    /// Unregister a repository, refusing while any of its worktrees is
    /// leased. Directory removal is best-effort; record removal is not.
    pub fn remove(&self, name: &str) -> Result<()> {
        let repo = self.store.repository_by_name(name)?;
        let worktrees = self.store.worktrees_by_repo(repo.id)?;

        let in_use = worktrees.iter().filter(|wt| wt.state.is_in_use()).count();
        if in_use > 0 {
            return Err(ArborError::InUseRefused { count: in_use });
        }

        warn!("removing repository '{name}'");

        let mut deleted = 0;
        for wt in &worktrees {
            match fs::remove_dir_all(&wt.path) {
                Ok(()) => deleted += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    error!("failed to delete worktree directory {}: {err}", wt.path.display());
                }
            }
            self.store.delete_worktree(wt.id)?;
        }

        self.store.delete_repository(name)?;

        info!("deleted {deleted} worktree(s); repository '{name}' removed");
        Ok(())
    }

    /// All registered repositories.
    pub fn list(&self) -> Result<Vec<Repository>> {
        self.store.list_repositories()
    }
}
