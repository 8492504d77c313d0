use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use taskops_core::TaskStatus;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};
use crate::store::RunStore;

/// Initialise the run-state schema in `conn`.
///
/// `task_state` holds one row per task name (the values the scheduler reads
/// back); `run_history` is append-only and exists for operators.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS task_state (
            name        TEXT    NOT NULL PRIMARY KEY,
            last_run    TEXT    NOT NULL,   -- RFC 3339
            last_status TEXT    NOT NULL,   -- success | failed | timeout | error
            updated_at  TEXT    NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS run_history (
            id          TEXT    NOT NULL PRIMARY KEY,
            task_name   TEXT    NOT NULL,
            finished_at TEXT    NOT NULL,
            status      TEXT    NOT NULL
        ) STRICT;

        -- Recent-runs lookups: WHERE task_name = ? ORDER BY finished_at DESC
        CREATE INDEX IF NOT EXISTS idx_run_history_task
            ON run_history (task_name, finished_at);
        ",
    )?;
    Ok(())
}

/// One row of `run_history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub task_name: String,
    pub finished_at: DateTime<Utc>,
    pub status: TaskStatus,
}

/// Latest state row for a task, as shown by `taskops status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateRecord {
    pub name: String,
    pub last_run: DateTime<Utc>,
    pub last_status: TaskStatus,
}

/// SQLite-backed [`RunStore`].
///
/// Wraps a single connection in a `Mutex`; every write is one transaction
/// taken under that lock, which is what makes `record_completion` atomic for
/// concurrent readers.
pub struct SqliteRunStore {
    db: Mutex<Connection>,
}

impl SqliteRunStore {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn)
    }

    /// Wrap an already-open connection, initialising the schema.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied
        // transaction behind (rusqlite rolls back on drop), so the
        // connection is still usable.
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent runs for `name`, newest first.
    pub fn recent_runs(&self, name: &str, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, task_name, finished_at, status FROM run_history
             WHERE task_name = ?1
             ORDER BY finished_at DESC, rowid DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![name, limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .filter_map(|r| match r {
                Ok((id, task_name, finished_at, status)) => Some(RunRecord {
                    id,
                    task_name,
                    finished_at: parse_ts(&finished_at)?,
                    status: status.parse().ok()?,
                }),
                Err(e) => {
                    warn!("skipping unreadable run_history row: {e}");
                    None
                }
            })
            .collect();
        Ok(rows)
    }

    /// Every task's latest state, ordered by name.
    pub fn all_states(&self) -> Result<Vec<StateRecord>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare_cached("SELECT name, last_run, last_status FROM task_state ORDER BY name")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .filter_map(|r| {
                let (name, last_run, last_status) = r.ok()?;
                Some(StateRecord {
                    name,
                    last_run: parse_ts(&last_run)?,
                    last_status: last_status.parse().ok()?,
                })
            })
            .collect();
        Ok(rows)
    }

    fn read_state(&self, name: &str) -> Result<Option<(String, String)>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT last_run, last_status FROM task_state WHERE name = ?1",
                [name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row)
    }
}

impl RunStore for SqliteRunStore {
    fn last_run(&self, name: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.last_completion(name)?.map(|(at, _)| at))
    }

    fn last_status(&self, name: &str) -> Result<Option<TaskStatus>> {
        Ok(self.last_completion(name)?.map(|(_, status)| status))
    }

    fn last_completion(&self, name: &str) -> Result<Option<(DateTime<Utc>, TaskStatus)>> {
        let Some((last_run, last_status)) = self.read_state(name)? else {
            return Ok(None);
        };
        let at = parse_ts(&last_run)
            .ok_or_else(|| SchedulerError::Store(format!("bad last_run for {name}: {last_run}")))?;
        let status = last_status
            .parse()
            .map_err(|e: String| SchedulerError::Store(format!("{name}: {e}")))?;
        Ok(Some((at, status)))
    }

    #[instrument(skip(self), fields(task = %name))]
    fn record_completion(&self, name: &str, at: DateTime<Utc>, status: TaskStatus) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let at_str = format_ts(at);
        let now_str = format_ts(Utc::now());
        let status_str = status.to_string();

        tx.execute(
            "INSERT INTO task_state (name, last_run, last_status, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(name) DO UPDATE SET
                last_run = excluded.last_run,
                last_status = excluded.last_status,
                updated_at = excluded.updated_at",
            rusqlite::params![name, at_str, status_str, now_str],
        )?;
        tx.execute(
            "INSERT INTO run_history (id, task_name, finished_at, status)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![Uuid::now_v7().to_string(), name, at_str, status_str],
        )?;
        tx.commit()?;

        debug!(%status, "completion recorded");
        Ok(())
    }

    fn health_check(&self) -> Result<()> {
        let conn = self.conn();
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}

/// Fixed-width UTC timestamps, so text ordering in SQL matches time ordering.
fn format_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();
        let store = SqliteRunStore::new(conn).unwrap();
        store.health_check().unwrap();
    }

    #[test]
    fn completion_is_visible_to_readers() {
        let store = SqliteRunStore::in_memory().unwrap();
        assert_eq!(store.last_completion("etl").unwrap(), None);

        let at = "2030-03-04T05:06:07Z".parse::<DateTime<Utc>>().unwrap();
        store.record_completion("etl", at, TaskStatus::Timeout).unwrap();

        assert_eq!(store.last_run("etl").unwrap(), Some(at));
        assert_eq!(store.last_status("etl").unwrap(), Some(TaskStatus::Timeout));
    }

    #[test]
    fn history_is_newest_first_and_limited() {
        let store = SqliteRunStore::in_memory().unwrap();
        let base = "2030-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        for (i, status) in [TaskStatus::Failed, TaskStatus::Error, TaskStatus::Success]
            .into_iter()
            .enumerate()
        {
            store
                .record_completion("job", base + chrono::Duration::hours(i as i64), status)
                .unwrap();
        }
        store.record_completion("other", base, TaskStatus::Success).unwrap();

        let runs = store.recent_runs("job", 2).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].status, TaskStatus::Success);
        assert_eq!(runs[1].status, TaskStatus::Error);

        let states = store.all_states().unwrap();
        let names: Vec<_> = states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["job", "other"]);
        assert_eq!(states[0].last_status, TaskStatus::Success);
    }
}
