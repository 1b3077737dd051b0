// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persistent print job queue backed by SQLite.
//
// The queue stores job metadata (but not the spooled document bytes —
// those live under `SystemConfig::spool_dir`, named by `Job::spool_file`)
// so jobs survive process restarts. The in-memory `Job` owned by each
// printer is the authoritative working copy; this table exists purely
// for crash recovery and job history.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use pressd_core::{CoreError, Job, JobId, JobState, JobStateReason, PrinterId, Result};
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument};

const CREATE_TABLE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY,
        printer_id INTEGER NOT NULL,
        state TEXT NOT NULL,
        state_reasons TEXT NOT NULL,
        spool_file TEXT NOT NULL,
        format TEXT NOT NULL,
        job_name TEXT NOT NULL,
        username TEXT NOT NULL,
        impressions INTEGER NOT NULL DEFAULT 0,
        impressions_completed INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        processing_at TEXT,
        completed_at TEXT,
        is_canceled INTEGER NOT NULL DEFAULT 0,
        message TEXT NOT NULL DEFAULT '',
        job_attributes TEXT NOT NULL DEFAULT '{}',
        retry_count INTEGER NOT NULL DEFAULT 0
    )
"#;

/// Migration to add the retry-count column to databases created before
/// automatic job retry existed.
const MIGRATE_RETRY_COLUMN_SQL: &str = "ALTER TABLE jobs ADD COLUMN retry_count INTEGER NOT NULL DEFAULT 0;";

/// Persistent job queue backed by a SQLite database.
///
/// All methods are synchronous because `rusqlite` does not support async
/// natively. Callers in async contexts wrap these in
/// `tokio::task::spawn_blocking`.
pub struct JobQueue {
    conn: Connection,
}

impl JobQueue {
    /// Open (or create) the job queue database at the given path, in
    /// WAL mode, creating the `jobs` table if needed.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(|e| db_err("open", e))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| db_err("WAL pragma", e))?;

        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;

        Self::migrate_retry_column(&conn);

        info!("job queue database opened");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| db_err("open in-memory", e))?;
        conn.execute_batch(CREATE_TABLE_SQL)
            .map_err(|e| db_err("create table", e))?;
        debug!("in-memory job queue database opened");
        Ok(Self { conn })
    }

    fn migrate_retry_column(conn: &Connection) {
        if conn.execute_batch(MIGRATE_RETRY_COLUMN_SQL).is_err() {
            // Column already exists — expected on a database created after
            // the column was added to CREATE_TABLE_SQL.
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn insert_job(&self, job: &Job) -> Result<()> {
        let state_json = serde_json::to_string(&job.state)?;
        let reasons_json = serde_json::to_string(&job.state_reasons)?;
        let attrs_json = serde_json::to_string(&job.job_attributes)?;

        self.conn
            .execute(
                "INSERT INTO jobs (id, printer_id, state, state_reasons, spool_file, format,
                 job_name, username, impressions, impressions_completed, created_at,
                 processing_at, completed_at, is_canceled, message, job_attributes, retry_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    job.id.to_string(),
                    job.printer_id.0,
                    state_json,
                    reasons_json,
                    job.spool_file,
                    job.format,
                    job.job_name,
                    job.username,
                    job.impressions,
                    job.impressions_completed,
                    job.created_at.to_rfc3339(),
                    job.processing_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.is_canceled,
                    job.message,
                    attrs_json,
                    0i64,
                ],
            )
            .map_err(|e| db_err("insert job", e))?;

        info!(job_id = %job.id, "job inserted into queue");
        Ok(())
    }

    /// Persist the job's current state, reasons, progress, and message.
    /// Called by the worker after each state transition so a crash mid-job
    /// resumes from the last checkpoint rather than from scratch.
    #[instrument(skip(self, job), fields(job_id = %job.id))]
    pub fn checkpoint(&self, job: &Job) -> Result<()> {
        let state_json = serde_json::to_string(&job.state)?;
        let reasons_json = serde_json::to_string(&job.state_reasons)?;

        let rows = self
            .conn
            .execute(
                "UPDATE jobs SET state = ?1, state_reasons = ?2, impressions_completed = ?3,
                 processing_at = ?4, completed_at = ?5, is_canceled = ?6, message = ?7
                 WHERE id = ?8",
                params![
                    state_json,
                    reasons_json,
                    job.impressions_completed,
                    job.processing_at.map(|t| t.to_rfc3339()),
                    job.completed_at.map(|t| t.to_rfc3339()),
                    job.is_canceled,
                    job.message,
                    job.id.to_string(),
                ],
            )
            .map_err(|e| db_err("checkpoint job", e))?;

        if rows == 0 {
            return Err(CoreError::JobNotFound(job.id.to_string()));
        }
        debug!(job_id = %job.id, state = ?job.state, "job checkpointed");
        Ok(())
    }

    pub fn increment_retry_count(&self, job_id: &JobId) -> Result<u32> {
        self.conn
            .execute(
                "UPDATE jobs SET retry_count = retry_count + 1 WHERE id = ?1",
                params![job_id.to_string()],
            )
            .map_err(|e| db_err("increment retry count", e))?;

        self.conn
            .query_row(
                "SELECT retry_count FROM jobs WHERE id = ?1",
                params![job_id.to_string()],
                |row| row.get::<_, i64>(0),
            )
            .map(|v| v as u32)
            .map_err(|e| db_err("read retry count", e))
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn get_job(&self, job_id: &JobId) -> Result<Option<Job>> {
        let mut stmt = self.conn.prepare(SELECT_COLUMNS).map_err(|e| db_err("prepare get_job", e))?;

        let mut rows = stmt
            .query_map(params![job_id.to_string()], row_to_job)
            .map_err(|e| db_err("query get_job", e))?;

        match rows.next() {
            Some(Ok(job)) => Ok(Some(job)),
            Some(Err(e)) => Err(CoreError::Database(format!("row parse: {e}"))),
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    pub fn get_jobs_for_printer(&self, printer_id: PrinterId) -> Result<Vec<Job>> {
        let sql = format!("{SELECT_COLUMNS} WHERE printer_id = ?1 ORDER BY created_at ASC");
        let mut stmt = self.conn.prepare(&sql).map_err(|e| db_err("prepare get_jobs_for_printer", e))?;

        let jobs = stmt
            .query_map(params![printer_id.0], row_to_job)
            .map_err(|e| db_err("query get_jobs_for_printer", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))?;

        debug!(printer_id = %printer_id, count = jobs.len(), "retrieved jobs for printer");
        Ok(jobs)
    }

    /// Non-terminal jobs (`held`, `pending`, `processing`) across all
    /// printers, in FIFO order — what the system replays on startup.
    #[instrument(skip(self))]
    pub fn get_unfinished_jobs(&self) -> Result<Vec<Job>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE state IN (?1, ?2, ?3) ORDER BY created_at ASC"
        );
        let mut stmt = self.conn.prepare(&sql).map_err(|e| db_err("prepare get_unfinished_jobs", e))?;

        let jobs = stmt
            .query_map(
                params![
                    serde_json::to_string(&JobState::Held)?,
                    serde_json::to_string(&JobState::Pending)?,
                    serde_json::to_string(&JobState::Processing)?,
                ],
                row_to_job,
            )
            .map_err(|e| db_err("query get_unfinished_jobs", e))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| db_err("collect rows", e))?;

        debug!(count = jobs.len(), "retrieved unfinished jobs");
        Ok(jobs)
    }

    #[instrument(skip(self), fields(job_id = %job_id))]
    pub fn delete_job(&self, job_id: &JobId) -> Result<()> {
        self.conn
            .execute("DELETE FROM jobs WHERE id = ?1", params![job_id.to_string()])
            .map_err(|e| db_err("delete job", e))?;

        info!(job_id = %job_id, "job deleted from queue");
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT id, printer_id, state, state_reasons, spool_file, format, \
     job_name, username, impressions, impressions_completed, created_at, processing_at, \
     completed_at, is_canceled, message, job_attributes FROM jobs";

fn db_err(context: &str, e: rusqlite::Error) -> CoreError {
    CoreError::Database(format!("{context}: {e}"))
}

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let id_str: String = row.get(0)?;
    let printer_id: u32 = row.get(1)?;
    let state_json: String = row.get(2)?;
    let reasons_json: String = row.get(3)?;
    let spool_file: String = row.get(4)?;
    let format: String = row.get(5)?;
    let job_name: String = row.get(6)?;
    let username: String = row.get(7)?;
    let impressions: u32 = row.get(8)?;
    let impressions_completed: u32 = row.get(9)?;
    let created_at_str: String = row.get(10)?;
    let processing_at_str: Option<String> = row.get(11)?;
    let completed_at_str: Option<String> = row.get(12)?;
    let is_canceled: bool = row.get(13)?;
    let message: String = row.get(14)?;
    let attrs_json: String = row.get(15)?;

    let from_sql_err = |col: usize, e: Box<dyn std::error::Error + Send + Sync>| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, e)
    };

    let uuid = uuid::Uuid::parse_str(&id_str).map_err(|e| from_sql_err(0, Box::new(e)))?;
    let state: JobState = serde_json::from_str(&state_json).map_err(|e| from_sql_err(2, Box::new(e)))?;
    let state_reasons: BTreeSet<JobStateReason> =
        serde_json::from_str(&reasons_json).map_err(|e| from_sql_err(3, Box::new(e)))?;
    let job_attributes: BTreeMap<String, String> =
        serde_json::from_str(&attrs_json).map_err(|e| from_sql_err(15, Box::new(e)))?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| from_sql_err(10, Box::new(e)))?;

    let processing_at = processing_at_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| from_sql_err(11, Box::new(e)))?;

    let completed_at = completed_at_str
        .map(|s| DateTime::parse_from_rfc3339(&s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| from_sql_err(12, Box::new(e)))?;

    Ok(Job {
        id: JobId(uuid),
        printer_id: PrinterId(printer_id),
        state,
        state_reasons,
        spool_file,
        format,
        job_name,
        username,
        impressions,
        impressions_completed,
        created_at,
        processing_at,
        completed_at,
        is_canceled,
        message,
        job_attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job() -> Job {
        Job::new(JobId::new(), PrinterId(1), "image/pwg-raster", "test.raster", "alice", BTreeMap::new())
    }

    #[test]
    fn insert_and_retrieve_job() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let job = test_job();
        queue.insert_job(&job).expect("insert");

        let retrieved = queue.get_job(&job.id).expect("get_job").expect("found");
        assert_eq!(retrieved.id, job.id);
        assert_eq!(retrieved.job_name, "test.raster");
        assert_eq!(retrieved.state, JobState::Held);
    }

    #[test]
    fn checkpoint_updates_state() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let mut job = test_job();
        queue.insert_job(&job).expect("insert");

        job.mark_pending();
        job.mark_processing();
        queue.checkpoint(&job).expect("checkpoint");

        let updated = queue.get_job(&job.id).expect("get_job").expect("found");
        assert_eq!(updated.state, JobState::Processing);
        assert!(updated.processing_at.is_some());
    }

    #[test]
    fn checkpoint_nonexistent_job_errors() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let job = test_job();
        let result = queue.checkpoint(&job);
        assert!(result.is_err());
    }

    #[test]
    fn get_jobs_for_printer_filters_correctly() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");

        let job1 = Job::new(JobId::new(), PrinterId(1), "image/pwg-raster", "a", "alice", BTreeMap::new());
        let job2 = Job::new(JobId::new(), PrinterId(2), "image/pwg-raster", "b", "bob", BTreeMap::new());
        queue.insert_job(&job1).expect("insert 1");
        queue.insert_job(&job2).expect("insert 2");

        let for_printer_1 = queue.get_jobs_for_printer(PrinterId(1)).expect("query");
        assert_eq!(for_printer_1.len(), 1);
        assert_eq!(for_printer_1[0].id, job1.id);
    }

    #[test]
    fn get_unfinished_jobs_excludes_terminal_states() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");

        let mut job1 = test_job();
        let job2 = test_job();
        queue.insert_job(&job1).expect("insert 1");
        queue.insert_job(&job2).expect("insert 2");

        job1.mark_pending();
        job1.mark_processing();
        job1.mark_terminal(JobState::Completed);
        queue.checkpoint(&job1).expect("checkpoint");

        let unfinished = queue.get_unfinished_jobs().expect("query");
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, job2.id);
    }

    #[test]
    fn increment_retry_count() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let job = test_job();
        queue.insert_job(&job).expect("insert");

        assert_eq!(queue.increment_retry_count(&job.id).expect("inc"), 1);
        assert_eq!(queue.increment_retry_count(&job.id).expect("inc"), 2);
    }

    #[test]
    fn delete_job_is_idempotent() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let job = test_job();
        queue.insert_job(&job).expect("insert");

        queue.delete_job(&job.id).expect("delete first time");
        queue.delete_job(&job.id).expect("delete second time (idempotent)");

        let result = queue.get_job(&job.id).expect("get_job");
        assert!(result.is_none());
    }

    #[test]
    fn get_nonexistent_job_returns_none() {
        let queue = JobQueue::open_in_memory().expect("open in-memory db");
        let result = queue.get_job(&JobId::new()).expect("get_job");
        assert!(result.is_none());
    }
}
