//! Thin driver over the installed `git` executable.
//!
//! Every mutation of the worktree root and of registered source repositories
//! funnels through the named operations here. Each failure carries the
//! command line and the trimmed stderr of the subprocess.

use std::{
    fs,
    path::Path,
    process::{Command, Output},
};

use tracing::warn;

use crate::error::{ArborError, Result};

/// Run a git command in `dir`, returning its output on success.
fn run_git(dir: &Path, args: &[&str]) -> Result<Output> {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .map_err(|err| {
            ArborError::Driver(format!("failed to execute git {}: {err}", args.join(" ")))
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ArborError::Driver(format!(
            "git {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }

    Ok(output)
}

/// Stdout of a git command as a trimmed string.
fn run_git_stdout(dir: &Path, args: &[&str]) -> Result<String> {
    let output = run_git(dir, args)?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Check that `path` is a usable source repository: an existing directory
/// holding a non-bare working copy whose remote refs can be listed.
pub fn validate_repo(path: &Path) -> Result<()> {
    let meta = fs::metadata(path).map_err(|_| {
        ArborError::InvalidArgument(format!("path does not exist: {}", path.display()))
    })?;
    if !meta.is_dir() {
        return Err(ArborError::InvalidArgument(format!(
            "path is not a directory: {}",
            path.display()
        )));
    }
    if !path.join(".git").exists() {
        return Err(ArborError::InvalidArgument(format!(
            "not a git repository (no .git): {}",
            path.display()
        )));
    }

    let bare = run_git_stdout(path, &["rev-parse", "--is-bare-repository"])?;
    if bare == "true" {
        return Err(ArborError::InvalidArgument(
            "bare repositories are not supported".to_string(),
        ));
    }

    run_git(path, &["branch", "-r"])?;
    Ok(())
}

/// Read the remote HEAD symbolic ref and return the unqualified branch name.
pub fn default_branch(path: &Path) -> Result<String> {
    const PREFIX: &str = "refs/remotes/origin/";

    let head = run_git_stdout(path, &["symbolic-ref", "refs/remotes/origin/HEAD"]).map_err(|_| {
        ArborError::InvalidArgument(
            "could not determine default branch; set the remote HEAD with \
             'git remote set-head origin -a' or pass a branch explicitly"
                .to_string(),
        )
    })?;

    match head.strip_prefix(PREFIX) {
        Some(branch) if !branch.is_empty() => Ok(branch.to_string()),
        _ => Err(ArborError::InvalidArgument(format!(
            "could not parse default branch from remote HEAD '{head}'"
        ))),
    }
}

/// Check that `branch` resolves locally or as `origin/<branch>`.
pub fn validate_branch(path: &Path, branch: &str) -> Result<()> {
    if run_git(path, &["rev-parse", "--verify", branch]).is_ok() {
        return Ok(());
    }
    let remote = format!("origin/{branch}");
    run_git(path, &["rev-parse", "--verify", &remote]).map_err(|_| {
        ArborError::InvalidArgument(format!("branch '{branch}' does not exist"))
    })?;
    Ok(())
}

/// Create a new worktree at `target` detached at `base_branch`'s commit.
pub fn create_worktree(repo_path: &Path, target: &Path, base_branch: &str) -> Result<()> {
    let target = path_str(target)?;
    run_git(
        repo_path,
        &["worktree", "add", "--detach", target, base_branch],
    )?;
    Ok(())
}

/// Fetch all remotes with prune.
pub fn fetch(repo_path: &Path) -> Result<()> {
    run_git(repo_path, &["fetch", "--all", "--prune"])?;
    Ok(())
}

/// Fetch just `origin`, used before a claim checkout.
pub fn fetch_origin(wt_path: &Path) -> Result<()> {
    run_git(wt_path, &["fetch", "origin"])?;
    Ok(())
}

/// Commit id of `origin/<base_branch>` in the source repository.
pub fn resolve_remote(repo_path: &Path, base_branch: &str) -> Result<String> {
    let refname = format!("origin/{base_branch}");
    run_git_stdout(repo_path, &["rev-parse", &refname])
}

/// Discard every local modification: `reset --hard HEAD` then remove all
/// untracked files, ignored ones included.
pub fn reset_clean(wt_path: &Path) -> Result<()> {
    run_git(wt_path, &["reset", "--hard", "HEAD"])?;
    run_git(wt_path, &["clean", "-fdx"])?;
    Ok(())
}

/// Force-move HEAD to `commit`, preserving detachment.
pub fn hard_reset_to(wt_path: &Path, commit: &str) -> Result<()> {
    run_git(wt_path, &["reset", "--hard", commit])?;
    Ok(())
}

/// Leave the worktree on a real branch named `branch`: reset it to
/// `origin/<branch>` when the remote ref exists, otherwise create it from
/// the current HEAD.
pub fn checkout_branch(wt_path: &Path, branch: &str) -> Result<()> {
    let remote = format!("origin/{branch}");
    if run_git(wt_path, &["checkout", "-B", branch, &remote]).is_ok() {
        return Ok(());
    }
    run_git(wt_path, &["checkout", "-b", branch]).map_err(|err| {
        ArborError::Driver(format!("failed to checkout branch '{branch}': {err}"))
    })?;
    Ok(())
}

/// Checkout in detached mode at `refname` (normally `origin/<base_branch>`).
pub fn detach_to(wt_path: &Path, refname: &str) -> Result<()> {
    run_git(wt_path, &["checkout", "--detach", refname])?;
    Ok(())
}

/// Remove a worktree: tracked removal first, then the directory itself,
/// then prune dangling worktree metadata in the source repository.
pub fn remove_worktree(repo_path: &Path, wt_path: &Path) -> Result<()> {
    if let Ok(target) = path_str(wt_path)
        && let Err(err) = run_git(repo_path, &["worktree", "remove", target, "--force"])
    {
        warn!("git worktree remove failed, deleting directory directly: {err}");
    }

    if wt_path.exists() {
        fs::remove_dir_all(wt_path)?;
    }

    // Dangling metadata is harmless; prune failures even more so.
    let _ = run_git(repo_path, &["worktree", "prune"]);
    Ok(())
}

/// A path as UTF-8, or an invalid-argument error.
fn path_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        ArborError::InvalidArgument(format!("path is not valid UTF-8: {}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Build a seed repository, a bare `origin` cloned from it, and a working
    /// clone wired to that origin with `origin/HEAD` set. Returns the temp
    /// root and the clone path.
    fn setup_clone() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let seed = tmp.path().join("seed");
        fs::create_dir_all(&seed).unwrap();
        run_git(&seed, &["init", "-b", "main"]).unwrap();
        run_git(&seed, &["config", "user.email", "test@example.com"]).unwrap();
        run_git(&seed, &["config", "user.name", "Test User"]).unwrap();
        fs::write(seed.join("README.md"), "# seed").unwrap();
        run_git(&seed, &["add", "README.md"]).unwrap();
        run_git(&seed, &["commit", "-m", "initial"]).unwrap();

        let origin = tmp.path().join("origin.git");
        run_git(
            tmp.path(),
            &["clone", "--bare", "seed", origin.to_str().unwrap()],
        )
        .unwrap();

        let clone = tmp.path().join("clone");
        run_git(
            tmp.path(),
            &["clone", origin.to_str().unwrap(), clone.to_str().unwrap()],
        )
        .unwrap();
        run_git(&clone, &["config", "user.email", "test@example.com"]).unwrap();
        run_git(&clone, &["config", "user.name", "Test User"]).unwrap();

        (tmp, clone)
    }

    #[test]
    fn validate_repo_accepts_clone() {
        let (_tmp, clone) = setup_clone();
        validate_repo(&clone).unwrap();
    }

    #[test]
    fn validate_repo_rejects_plain_directory() {
        let tmp = TempDir::new().unwrap();
        let err = validate_repo(tmp.path()).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn validate_repo_rejects_missing_path() {
        let err = validate_repo(Path::new("/nonexistent/arbor-test")).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn default_branch_reads_remote_head() {
        let (_tmp, clone) = setup_clone();
        assert_eq!(default_branch(&clone).unwrap(), "main");
    }

    #[test]
    fn validate_branch_local_and_missing() {
        let (_tmp, clone) = setup_clone();
        validate_branch(&clone, "main").unwrap();
        let err = validate_branch(&clone, "no-such-branch").unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn create_worktree_is_detached_at_base() {
        let (tmp, clone) = setup_clone();
        let wt = tmp.path().join("wt");
        create_worktree(&clone, &wt, "main").unwrap();
        assert!(wt.join("README.md").exists());

        // Detached HEAD: symbolic-ref refuses to resolve.
        assert!(run_git(&wt, &["symbolic-ref", "-q", "HEAD"]).is_err());

        let head = run_git_stdout(&wt, &["rev-parse", "HEAD"]).unwrap();
        let base = resolve_remote(&clone, "main").unwrap();
        assert_eq!(head, base);
    }

    #[test]
    fn reset_clean_removes_untracked_and_ignored() {
        let (tmp, clone) = setup_clone();
        let wt = tmp.path().join("wt");
        create_worktree(&clone, &wt, "main").unwrap();

        fs::write(wt.join("untracked.txt"), "scratch").unwrap();
        fs::write(wt.join("README.md"), "modified").unwrap();

        reset_clean(&wt).unwrap();
        assert!(!wt.join("untracked.txt").exists());
        assert_eq!(fs::read_to_string(wt.join("README.md")).unwrap(), "# seed");
    }

    #[test]
    fn checkout_branch_falls_back_to_local_creation() {
        let (tmp, clone) = setup_clone();
        let wt = tmp.path().join("wt");
        create_worktree(&clone, &wt, "main").unwrap();

        // No origin/feat-x exists, so the branch is created from HEAD.
        checkout_branch(&wt, "feat-x").unwrap();
        let head = run_git_stdout(&wt, &["symbolic-ref", "--short", "HEAD"]).unwrap();
        assert_eq!(head, "feat-x");

        // And back to detached mode for reuse.
        detach_to(&wt, "origin/main").unwrap();
        assert!(run_git(&wt, &["symbolic-ref", "-q", "HEAD"]).is_err());
    }

    #[test]
    fn remove_worktree_deletes_directory() {
        let (tmp, clone) = setup_clone();
        let wt = tmp.path().join("wt");
        create_worktree(&clone, &wt, "main").unwrap();
        assert!(wt.exists());

        remove_worktree(&clone, &wt).unwrap();
        assert!(!wt.exists());
    }

    #[test]
    fn remove_worktree_tolerates_missing_directory() {
        let (tmp, clone) = setup_clone();
        let wt = tmp.path().join("never-created");
        remove_worktree(&clone, &wt).unwrap();
        assert!(!tmp.path().join("never-created").exists());
    }
}
