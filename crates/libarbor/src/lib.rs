#![warn(missing_docs)]
//! Core library for arbor, a local daemon that keeps pools of pre-prepared
//! Git worktrees warm so consumers can claim a ready working directory in
//! milliseconds instead of cloning on demand.
//!
//! The pieces, leaves first: a [`store`] of repository and worktree records,
//! a [`git`] driver over the installed executable, an [`allocator`] of
//! per-worktree primitives, the [`pool`] engine that owns every state
//! transition, a periodic [`reconciler`], and the [`daemon`] that exposes it
//! all over a Unix-socket [`ipc`] protocol.

/// Stateless per-worktree primitives bridging the store and the git driver.
pub mod allocator;
/// Branch-name validation applied before requests leave the client.
pub mod branch;
/// Service configuration.
pub mod config;
/// The background service and its IPC handler surface.
pub mod daemon;
/// Error types shared across the crate.
pub mod error;
/// Driver over the installed `git` executable.
pub mod git;
/// Local IPC protocol, server, and client.
pub mod ipc;
/// Domain records and state machine types.
pub mod models;
/// The pool lifecycle engine.
pub mod pool;
/// Periodic pool maintenance.
pub mod reconciler;
/// Repository registration and removal.
pub mod repo;
/// SQLite-backed metadata store.
pub mod store;

pub use allocator::Allocator;
pub use branch::validate_branch_name;
pub use config::Config;
pub use daemon::Daemon;
pub use error::{ArborError, Result};
pub use models::{
    DaemonStatus, PoolStatus, ReconcilerRun, Repository, Worktree, WorktreeDetail, WorktreeState,
};
pub use pool::Pool;
pub use reconciler::Reconciler;
pub use repo::RepoManager;
pub use store::Store;
