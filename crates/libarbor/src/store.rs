//! SQLite-backed metadata store.
//!
//! One file under the worktree root holds every repository, worktree, and
//! reconciler-run record. Queries are synchronous; writers are serialized by
//! the pool engine, so a plain `Mutex<Connection>` is all the concurrency
//! control the store needs.

use std::{
    path::Path,
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::{
    error::{ArborError, Result},
    models::{Repository, ReconcilerRun, Worktree, WorktreeDetail, WorktreeState},
};

/// File name of the store inside the worktree directory.
pub const DB_FILE: &str = "arbor.db";

/// Idle/in-use/corrupt counters for one repository.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    /// Worktrees parked in the pool.
    pub idle: u32,
    /// Worktrees currently leased.
    pub in_use: u32,
    /// Worktrees awaiting collection.
    pub corrupt: u32,
}

impl StatusCounts {
    /// All worktrees regardless of state.
    pub fn total(&self) -> u32 {
        self.idle + self.in_use + self.corrupt
    }

    /// Everything that occupies capacity (corrupt entries do not).
    pub fn non_corrupt(&self) -> u32 {
        self.idle + self.in_use
    }
}

/// Durable record of repositories, worktrees, and reconciler runs.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store inside `worktree_dir` and apply the schema.
    pub fn open(worktree_dir: &Path) -> Result<Self> {
        Self::open_at(&worktree_dir.join(DB_FILE))
    }

    /// Open (or create) the store at an explicit file path.
    pub fn open_at(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Repositories

    /// Persist a new repository registration.
    pub fn insert_repository(&self, repo: &Repository) -> Result<()> {
        self.conn().execute(
            "INSERT INTO repositories (id, name, path, max_worktrees, base_branch, last_fetch_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                repo.id.to_string(),
                repo.name,
                repo.path.to_string_lossy(),
                repo.max_worktrees,
                repo.base_branch,
                repo.last_fetch_at.map(|t| t.to_rfc3339()),
                repo.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a repository by its unique name.
    pub fn repository_by_name(&self, name: &str) -> Result<Repository> {
        self.conn()
            .query_row(
                &format!("{REPO_SELECT} WHERE name = ?1"),
                params![name],
                repo_from_row,
            )
            .optional()?
            .ok_or_else(|| ArborError::RepoNotFound(name.to_string()))
    }

    /// Look up a repository by id.
    pub fn repository_by_id(&self, id: Uuid) -> Result<Repository> {
        self.conn()
            .query_row(
                &format!("{REPO_SELECT} WHERE id = ?1"),
                params![id.to_string()],
                repo_from_row,
            )
            .optional()?
            .ok_or_else(|| ArborError::RepoNotFound(id.to_string()))
    }

    /// All registered repositories, ordered by name.
    pub fn list_repositories(&self) -> Result<Vec<Repository>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("{REPO_SELECT} ORDER BY name"))?;
        let rows = stmt.query_map([], repo_from_row)?;
        collect(rows)
    }

    /// Delete a repository record; worktree records cascade.
    pub fn delete_repository(&self, name: &str) -> Result<()> {
        self.conn()
            .execute("DELETE FROM repositories WHERE name = ?1", params![name])?;
        Ok(())
    }

    /// Record the time of the latest successful fetch.
    pub fn set_last_fetch(&self, name: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn().execute(
            "UPDATE repositories SET last_fetch_at = ?1 WHERE name = ?2",
            params![at.to_rfc3339(), name],
        )?;
        Ok(())
    }

    // Worktrees

    /// Persist a new worktree record.
    pub fn insert_worktree(&self, wt: &Worktree) -> Result<()> {
        let (status, leased_at, branch) = wt.state.to_columns();
        self.conn().execute(
            "INSERT INTO worktrees (id, repo_id, path, status, leased_at, branch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                wt.id.to_string(),
                wt.repo_id.to_string(),
                wt.path.to_string_lossy(),
                status,
                leased_at.map(|t| t.to_rfc3339()),
                branch,
                wt.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Look up a worktree by its identifier, which is also its directory
    /// name.
    pub fn worktree(&self, id: &str) -> Result<Worktree> {
        self.conn()
            .query_row(
                &format!("{WT_SELECT} WHERE id = ?1"),
                params![id],
                wt_from_row,
            )
            .optional()?
            .ok_or_else(|| ArborError::WorktreeNotFound(id.to_string()))
    }

    /// All worktrees of one repository, oldest first.
    pub fn worktrees_by_repo(&self, repo_id: Uuid) -> Result<Vec<Worktree>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare(&format!("{WT_SELECT} WHERE repo_id = ?1 ORDER BY created_at"))?;
        let rows = stmt.query_map(params![repo_id.to_string()], wt_from_row)?;
        collect(rows)
    }

    /// Idle worktrees of one repository, oldest first.
    pub fn idle_worktrees_by_repo(&self, repo_id: Uuid) -> Result<Vec<Worktree>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "{WT_SELECT} WHERE repo_id = ?1 AND status = 'idle' ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![repo_id.to_string()], wt_from_row)?;
        collect(rows)
    }

    /// Replace the status, lease, and branch columns in one statement, so a
    /// transition is never half-visible.
    pub fn set_worktree_state(&self, id: Uuid, state: &WorktreeState) -> Result<()> {
        let (status, leased_at, branch) = state.to_columns();
        self.conn().execute(
            "UPDATE worktrees SET status = ?1, leased_at = ?2, branch = ?3 WHERE id = ?4",
            params![
                status,
                leased_at.map(|t| t.to_rfc3339()),
                branch,
                id.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Whether any in-use worktree of the repository holds `branch`.
    pub fn branch_in_use(&self, repo_id: Uuid, branch: &str) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM worktrees
             WHERE repo_id = ?1 AND branch = ?2 AND status = 'in-use'",
            params![repo_id.to_string(), branch],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Delete a worktree record.
    pub fn delete_worktree(&self, id: Uuid) -> Result<()> {
        self.conn()
            .execute("DELETE FROM worktrees WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// Count one repository's worktrees per status.
    pub fn count_by_status(&self, repo_id: Uuid) -> Result<StatusCounts> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM worktrees WHERE repo_id = ?1 GROUP BY status",
        )?;
        let mut rows = stmt.query(params![repo_id.to_string()])?;

        let mut counts = StatusCounts::default();
        while let Some(row) = rows.next()? {
            let status: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            match status.as_str() {
                "idle" => counts.idle = count,
                "in-use" => counts.in_use = count,
                "corrupt" => counts.corrupt = count,
                other => {
                    return Err(ArborError::Internal(format!(
                        "unknown worktree status in store: {other}"
                    )));
                }
            }
        }
        Ok(counts)
    }

    /// Every worktree joined with its repository: leased ones first, then
    /// newest first.
    pub fn list_worktree_details(&self) -> Result<Vec<WorktreeDetail>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT w.id, w.repo_id, w.path, w.status, w.leased_at, w.branch, w.created_at,
                    r.id, r.name, r.path, r.max_worktrees, r.base_branch, r.last_fetch_at, r.created_at
             FROM worktrees w
             JOIN repositories r ON w.repo_id = r.id
             ORDER BY
                 CASE WHEN w.status = 'in-use' THEN 0 ELSE 1 END,
                 w.created_at DESC,
                 r.name",
        )?;
        let rows = stmt.query_map([], |row| {
            let worktree = wt_from_row(row)?;
            let repository = repo_from_row_offset(row, 7)?;
            Ok(WorktreeDetail {
                worktree,
                repository,
            })
        })?;
        collect(rows)
    }

    // Reconciler runs

    /// Append a completed reconciler run.
    pub fn insert_reconciler_run(&self, run: &ReconcilerRun) -> Result<()> {
        self.conn().execute(
            "INSERT INTO reconciler_runs (id, run_at, created, cleaned) VALUES (?1, ?2, ?3, ?4)",
            params![
                run.id.to_string(),
                run.run_at.to_rfc3339(),
                run.created,
                run.cleaned,
            ],
        )?;
        Ok(())
    }

    /// The most recent reconciler run, if any pass completed yet.
    pub fn last_reconciler_run(&self) -> Result<Option<ReconcilerRun>> {
        let run = self
            .conn()
            .query_row(
                "SELECT id, run_at, created, cleaned FROM reconciler_runs
                 ORDER BY run_at DESC LIMIT 1",
                [],
                |row| {
                    Ok(ReconcilerRun {
                        id: parse_uuid(row.get::<_, String>(0)?)?,
                        run_at: parse_ts(row.get::<_, String>(1)?)?,
                        created: row.get(2)?,
                        cleaned: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(run)
    }
}

const REPO_SELECT: &str = "SELECT id, name, path, max_worktrees, base_branch, last_fetch_at, \
                           created_at FROM repositories";
const WT_SELECT: &str =
    "SELECT id, repo_id, path, status, leased_at, branch, created_at FROM worktrees";

/// Apply the current schema. Idempotent and forward-only: the base tables use
/// `IF NOT EXISTS`, and additive columns are applied only when the column is
/// genuinely absent, detected by introspecting the table rather than by
/// matching driver error strings.
fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS repositories (
             id TEXT PRIMARY KEY,
             name TEXT UNIQUE NOT NULL,
             path TEXT NOT NULL,
             max_worktrees INTEGER NOT NULL,
             base_branch TEXT NOT NULL,
             created_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS worktrees (
             id TEXT PRIMARY KEY,
             repo_id TEXT NOT NULL REFERENCES repositories(id) ON DELETE CASCADE,
             path TEXT NOT NULL,
             status TEXT NOT NULL,
             leased_at TEXT,
             branch TEXT,
             created_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS reconciler_runs (
             id TEXT PRIMARY KEY,
             run_at TEXT NOT NULL,
             created INTEGER NOT NULL,
             cleaned INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS idx_worktrees_repo_id ON worktrees(repo_id);
         CREATE INDEX IF NOT EXISTS idx_worktrees_status ON worktrees(status);",
    )?;

    if !column_exists(conn, "repositories", "last_fetch_at")? {
        conn.execute("ALTER TABLE repositories ADD COLUMN last_fetch_at TEXT", [])?;
    }

    Ok(())
}

/// Whether `table` already has a column named `column`.
fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn repo_from_row(row: &Row<'_>) -> rusqlite::Result<Repository> {
    repo_from_row_offset(row, 0)
}

fn repo_from_row_offset(row: &Row<'_>, base: usize) -> rusqlite::Result<Repository> {
    Ok(Repository {
        id: parse_uuid(row.get::<_, String>(base)?)?,
        name: row.get(base + 1)?,
        path: row.get::<_, String>(base + 2)?.into(),
        max_worktrees: row.get(base + 3)?,
        base_branch: row.get(base + 4)?,
        last_fetch_at: row
            .get::<_, Option<String>>(base + 5)?
            .map(parse_ts)
            .transpose()?,
        created_at: parse_ts(row.get::<_, String>(base + 6)?)?,
    })
}

fn wt_from_row(row: &Row<'_>) -> rusqlite::Result<Worktree> {
    let status: String = row.get(3)?;
    let leased_at = row.get::<_, Option<String>>(4)?.map(parse_ts).transpose()?;
    let branch: Option<String> = row.get(5)?;
    let state = WorktreeState::from_columns(&status, leased_at, branch)
        .map_err(|err| to_column_error(3, err))?;

    Ok(Worktree {
        id: parse_uuid(row.get::<_, String>(0)?)?,
        repo_id: parse_uuid(row.get::<_, String>(1)?)?,
        path: row.get::<_, String>(2)?.into(),
        state,
        created_at: parse_ts(row.get::<_, String>(6)?)?,
    })
}

fn parse_uuid(raw: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&raw).map_err(|err| to_column_error(0, err))
}

fn parse_ts(raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|err| to_column_error(0, err))
}

fn to_column_error(
    index: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        Box::new(err),
    )
}

fn collect<T>(rows: impl Iterator<Item = rusqlite::Result<T>>) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}
