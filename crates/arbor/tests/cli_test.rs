//! End-to-end tests driving the `arbor` binary against a live daemon.

#![allow(clippy::tests_outside_test_module)]
#![allow(missing_docs)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::{Child, Command, Output},
    thread,
    time::Duration,
};

use tempfile::TempDir;

fn arbor_binary() -> &'static str {
    env!("CARGO_BIN_EXE_arbor")
}

fn git(dir: &Path, args: &[&str]) {
    let output = Command::new("git")
        .current_dir(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

/// Build a source working copy wired to a bare origin under `root`.
fn setup_source(root: &Path) -> PathBuf {
    let seed = root.join("seed");
    fs::create_dir_all(&seed).unwrap();
    git(&seed, &["init", "-b", "main"]);
    git(&seed, &["config", "user.email", "test@example.com"]);
    git(&seed, &["config", "user.name", "Test User"]);
    fs::write(seed.join("README.md"), "# test").unwrap();
    git(&seed, &["add", "README.md"]);
    git(&seed, &["commit", "-m", "initial"]);

    let origin = root.join("origin.git");
    git(root, &["clone", "--bare", "seed", origin.to_str().unwrap()]);

    let source = root.join("source");
    git(
        root,
        &["clone", origin.to_str().unwrap(), source.to_str().unwrap()],
    );
    source
}

/// A daemon child process rooted in a scratch config directory.
struct DaemonUnderTest {
    config_dir: PathBuf,
    child: Child,
    _tmp: TempDir,
}

impl DaemonUnderTest {
    fn start() -> Self {
        let tmp = TempDir::new().unwrap();
        let config_dir = tmp.path().join("arbor-home");

        let child = Command::new(arbor_binary())
            .args(["--config-dir", config_dir.to_str().unwrap(), "daemon"])
            .spawn()
            .expect("failed to spawn daemon");

        let daemon = Self {
            config_dir,
            child,
            _tmp: tmp,
        };
        daemon.wait_for_socket();
        daemon
    }

    fn socket_path(&self) -> PathBuf {
        self.config_dir.join("worktrees").join("daemon.sock")
    }

    fn wait_for_socket(&self) {
        for _ in 0..100 {
            if self.socket_path().exists() {
                return;
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("daemon never created its socket");
    }

    fn arbor(&self, args: &[&str]) -> Output {
        Command::new(arbor_binary())
            .arg("--config-dir")
            .arg(&self.config_dir)
            .args(args)
            .output()
            .expect("failed to run arbor")
    }

    fn arbor_ok(&self, args: &[&str]) -> String {
        let output = self.arbor(args);
        assert!(
            output.status.success(),
            "arbor {args:?} failed: stdout={} stderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }
}

impl Drop for DaemonUnderTest {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn track_claim_release_untrack_flow() {
    let daemon = DaemonUnderTest::start();
    let source = setup_source(daemon._tmp.path());

    let out = daemon.arbor_ok(&[
        "track",
        "app",
        source.to_str().unwrap(),
        "--max",
        "2",
    ]);
    assert!(out.contains("Tracking 'app'"), "got: {out}");
    assert!(out.contains("main"), "got: {out}");

    let out = daemon.arbor_ok(&["pool"]);
    assert!(out.contains("app"), "got: {out}");

    let out = daemon.arbor_ok(&["claim", "app", "feat-1"]);
    let claim: serde_json::Value = serde_json::from_str(&out).expect("claim output is JSON");
    let path = PathBuf::from(claim["path"].as_str().unwrap());
    let worktree_id = claim["worktree_id"].as_str().unwrap().to_string();
    assert!(path.exists());

    let out = daemon.arbor_ok(&["list"]);
    assert!(out.contains("feat-1"), "got: {out}");
    assert!(out.contains("IN-USE"), "got: {out}");

    let out = daemon.arbor_ok(&["show", &worktree_id]);
    assert!(out.contains("in-use"), "got: {out}");

    // Untrack must refuse while the claim is outstanding.
    let output = daemon.arbor(&["untrack", "app"]);
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("in_use_refused"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    daemon.arbor_ok(&["release", &worktree_id]);
    daemon.arbor_ok(&["untrack", "app"]);
    assert!(!path.exists());
}

#[test]
fn status_reports_running_daemon() {
    let daemon = DaemonUnderTest::start();
    let out = daemon.arbor_ok(&["status"]);
    assert!(out.contains("running:         true"), "got: {out}");
    assert!(out.contains("repositories:    0"), "got: {out}");
}

#[test]
fn claim_validates_branch_name_before_transport() {
    let daemon = DaemonUnderTest::start();
    let output = daemon.arbor(&["claim", "app", "bad..name"]);
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("invalid"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn second_daemon_refuses_to_start() {
    let daemon = DaemonUnderTest::start();

    let output = Command::new(arbor_binary())
        .args(["--config-dir", daemon.config_dir.to_str().unwrap(), "daemon"])
        .output()
        .expect("failed to run arbor");
    assert!(!output.status.success());
    assert!(
        String::from_utf8_lossy(&output.stderr).contains("already"),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
}
