//! Periodic pool maintenance.
//!
//! One background thread keeps every pool at its target size and collects
//! corrupt worktrees. It never touches the network: fetching and updating
//! idle worktrees only happens through the explicit refresh operation.

use std::{
    sync::{Arc, mpsc},
    thread,
    time::Duration,
};

use tracing::{error, info};

use crate::{models::ReconcilerRun, pool::Pool, store::Store};

/// Handle to the running reconciler thread.
pub struct Reconciler {
    stop_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Reconciler {
    /// Start the reconciler: an immediate first pass, then one every
    /// `interval`.
    pub fn spawn(store: Arc<Store>, pool: Arc<Pool>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("reconciler".to_string())
            .spawn(move || run(&store, &pool, interval, &stop_rx))
            .expect("failed to spawn reconciler thread");

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Ask the loop to stop and wait for it. A pass already in progress runs
    /// to completion.
    pub fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run(store: &Store, pool: &Pool, interval: Duration, stop_rx: &mpsc::Receiver<()>) {
    reconcile_all(store, pool);
    loop {
        match stop_rx.recv_timeout(interval) {
            Err(mpsc::RecvTimeoutError::Timeout) => reconcile_all(store, pool),
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// One maintenance pass over every repository. Failures in one repository
/// never stop the others.
fn reconcile_all(store: &Store, pool: &Pool) {
    let repos = match store.list_repositories() {
        Ok(repos) => repos,
        Err(err) => {
            error!("reconciler failed to list repositories: {err}");
            return;
        }
    };

    let mut run = ReconcilerRun::new();
    for repo in repos {
        match pool.reconcile(&repo, false) {
            Ok((created, cleaned)) => {
                run.created += created;
                run.cleaned += cleaned;
            }
            Err(err) => error!("failed to reconcile pool for '{}': {err}", repo.name),
        }
    }

    if let Err(err) = store.insert_reconciler_run(&run) {
        error!("failed to record reconciler run: {err}");
    }

    if run.created > 0 || run.cleaned > 0 {
        info!(
            "reconciler pass complete: created={}, cleaned={}",
            run.created, run.cleaned
        );
    }
}
