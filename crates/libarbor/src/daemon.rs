//! The background service: component wiring, the IPC handler surface, and
//! shutdown.

use std::{
    sync::{
        Arc,
        atomic::AtomicBool,
    },
    time::Instant,
};

use tracing::{error, info};

use crate::{
    allocator::Allocator,
    config::Config,
    error::Result,
    ipc::{
        ClaimRequest, ClaimResponse, Handler, PoolStatusRequest, RefreshRequest, RefreshResponse,
        ReleaseRequest, RepoAddRequest, Response, Server, ShowRequest,
    },
    models::{DaemonStatus, WorktreeDetail},
    pool::Pool,
    reconciler::Reconciler,
    repo::RepoManager,
    store::Store,
};

/// The assembled service.
pub struct Daemon {
    config: Config,
    store: Arc<Store>,
    repos: RepoManager,
    pool: Arc<Pool>,
    started_at: Instant,
}

impl Daemon {
    /// Open the store and wire every component. No I/O happens on the socket
    /// until [`Daemon::run`].
    pub fn new(config: Config) -> Result<Self> {
        config.ensure_worktree_dir()?;

        let store = Arc::new(Store::open(&config.worktree_dir)?);
        let pool = Arc::new(Pool::new(
            Arc::clone(&store),
            Allocator::new(config.worktree_dir.clone()),
        ));
        let repos = RepoManager::new(Arc::clone(&store));

        Ok(Self {
            config,
            store,
            repos,
            pool,
            started_at: Instant::now(),
        })
    }

    /// Serve until SIGINT or SIGTERM: start the reconciler, accept
    /// connections, then quiesce, remove the socket, and close the store.
    pub fn run(self) -> Result<()> {
        info!("starting arbor daemon");
        info!("worktree directory: {}", self.config.worktree_dir.display());
        info!(
            "reconciliation interval: {}",
            humantime::format_duration(self.config.reconciliation_interval)
        );

        let server = Server::bind(&self.config.socket_path)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        signal_hook::flag::register(signal_hook::consts::SIGINT, Arc::clone(&shutdown))?;
        signal_hook::flag::register(signal_hook::consts::SIGTERM, Arc::clone(&shutdown))?;

        let reconciler = Reconciler::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            self.config.reconciliation_interval,
        );

        let daemon: Arc<dyn Handler> = Arc::new(self);
        let result = server.serve(daemon, &shutdown);

        info!("shutting down");
        reconciler.stop();
        server.remove_socket();
        info!("daemon stopped");
        result
    }
}

impl Handler for Daemon {
    fn repo_add(&self, req: RepoAddRequest) -> Response {
        let repo = match self.repos.add(
            &req.name,
            std::path::Path::new(&req.path),
            &req.base_branch,
            req.max_worktrees,
        ) {
            Ok(repo) => repo,
            Err(err) => return Response::err(&err),
        };

        // Initial worktrees up to the repository's capacity.
        self.pool.create_initial(&repo, repo.max_worktrees);

        Response::ok(&repo)
    }

    fn repo_list(&self) -> Response {
        match self.repos.list() {
            Ok(repos) => Response::ok(repos),
            Err(err) => Response::err(&err),
        }
    }

    fn repo_remove(&self, name: String) -> Response {
        match self.repos.remove(&name) {
            Ok(()) => Response::ok_empty(),
            Err(err) => Response::err(&err),
        }
    }

    fn claim(&self, req: ClaimRequest) -> Response {
        match self.pool.claim(&req.repo_name, &req.branch) {
            Ok(wt) => Response::ok(ClaimResponse {
                worktree_id: wt.dir_name(),
                path: wt.path,
            }),
            Err(err) => Response::err(&err),
        }
    }

    fn release(&self, req: ReleaseRequest) -> Response {
        match self.pool.release(&req.worktree_id) {
            Ok(()) => Response::ok_empty(),
            Err(err) => Response::err(&err),
        }
    }

    fn pool_status(&self, req: PoolStatusRequest) -> Response {
        match self.pool.pool_status(req.repo_name.as_deref()) {
            Ok(statuses) => Response::ok(statuses),
            Err(err) => Response::err(&err),
        }
    }

    fn daemon_status(&self) -> Response {
        let repositories = match self.repos.list() {
            Ok(repos) => repos.len(),
            Err(err) => {
                error!("failed to list repositories for status: {err}");
                0
            }
        };
        let last_reconciler = self
            .store
            .last_reconciler_run()
            .ok()
            .flatten()
            .map(|run| run.run_at);

        let uptime = std::time::Duration::from_secs(self.started_at.elapsed().as_secs());
        Response::ok(DaemonStatus {
            running: true,
            socket_path: self.config.socket_path.clone(),
            last_reconciler,
            repositories,
            uptime: humantime::format_duration(uptime).to_string(),
        })
    }

    fn worktree_list(&self) -> Response {
        match self.store.list_worktree_details() {
            Ok(details) => Response::ok(details),
            Err(err) => Response::err(&err),
        }
    }

    fn refresh(&self, req: RefreshRequest) -> Response {
        let repo = match self.store.repository_by_name(&req.repo_name) {
            Ok(repo) => repo,
            Err(err) => return Response::err(&err),
        };

        info!("manually refreshing repository '{}'", repo.name);
        match self.pool.reconcile(&repo, true) {
            Ok((created, cleaned)) => Response::ok(RefreshResponse {
                repository: repo.name,
                worktrees_updated: created,
                worktrees_cleaned: cleaned,
            }),
            Err(err) => Response::err(&err),
        }
    }

    fn show(&self, req: ShowRequest) -> Response {
        let worktree = match self.store.worktree(&req.worktree_id) {
            Ok(wt) => wt,
            Err(err) => return Response::err(&err),
        };
        match self.store.repository_by_id(worktree.repo_id) {
            Ok(repository) => Response::ok(WorktreeDetail {
                worktree,
                repository,
            }),
            Err(err) => Response::err(&err),
        }
    }
}
