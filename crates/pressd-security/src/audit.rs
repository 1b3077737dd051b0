// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Audit trail — append-only SQLite log of every security-relevant
// operation: authorization decisions, printer/job lifecycle
// transitions, and subscription create/cancel.
//
// Schema:
//   audit_log(
//     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//     timestamp   TEXT    NOT NULL,   -- RFC 3339
//     actor       TEXT    NOT NULL,   -- username, or "-" when unauthenticated
//     action      TEXT    NOT NULL,   -- e.g. "create-printer", "cancel-job"
//     object_kind TEXT    NOT NULL,   -- "printer" | "job" | "subscription" | "system"
//     object_id   TEXT    NOT NULL,
//     success     INTEGER NOT NULL,   -- 0 = failure, 1 = success
//     detail      TEXT                -- optional free-form context
//   )

use std::path::Path;

use chrono::Utc;
use pressd_core::CoreError;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

fn db_err(e: rusqlite::Error) -> CoreError {
    CoreError::Database(e.to_string())
}

/// A single entry in the audit log, used for queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: String,
    pub actor: String,
    pub action: String,
    pub object_kind: String,
    pub object_id: String,
    pub success: bool,
    pub detail: Option<String>,
}

/// Append-only audit log backed by a SQLite database.
pub struct AuditLog {
    conn: Connection,
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS audit_log (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp   TEXT    NOT NULL,
    actor       TEXT    NOT NULL,
    action      TEXT    NOT NULL,
    object_kind TEXT    NOT NULL,
    object_id   TEXT    NOT NULL,
    success     INTEGER NOT NULL,
    detail      TEXT
);";

const CREATE_STATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS system_state (
    id      INTEGER PRIMARY KEY CHECK (id = 1),
    payload TEXT NOT NULL
);";

impl AuditLog {
    /// Open (or create) the audit database at `path`. WAL mode is enabled
    /// for concurrent-read performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(db_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;").map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE).map_err(db_err)?;
        conn.execute_batch(CREATE_STATE_TABLE).map_err(db_err)?;
        debug!("audit log opened");
        Ok(Self { conn })
    }

    /// Open an in-memory audit database (used by tests and by ephemeral
    /// `list-devices` style CLI invocations that never persist).
    pub fn open_in_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(CREATE_TABLE).map_err(db_err)?;
        conn.execute_batch(CREATE_STATE_TABLE).map_err(db_err)?;
        debug!("in-memory audit log opened");
        Ok(Self { conn })
    }

    /// Overwrite the single persisted system-state row. Shares this log's
    /// connection rather than a second database file, so a save-state write
    /// and an audit entry for the same event land in the same WAL.
    pub fn save_state(&self, payload: &str) -> Result<(), CoreError> {
        self.conn
            .execute(
                "INSERT INTO system_state (id, payload) VALUES (1, ?1)
                 ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
                params![payload],
            )
            .map_err(db_err)?;
        Ok(())
    }

    /// The last persisted system-state payload, if any was ever saved.
    pub fn load_state(&self) -> Result<Option<String>, CoreError> {
        self.conn
            .query_row("SELECT payload FROM system_state WHERE id = 1", [], |row| row.get(0))
            .map(Some)
            .or_else(|e| if matches!(e, rusqlite::Error::QueryReturnedNoRows) { Ok(None) } else { Err(db_err(e)) })
    }

    #[instrument(skip(self, detail), fields(%actor, %action, %object_kind, %object_id, success))]
    pub fn record(
        &self,
        actor: &str,
        action: &str,
        object_kind: &str,
        object_id: &str,
        success: bool,
        detail: Option<&str>,
    ) -> Result<(), CoreError> {
        let timestamp = Utc::now().to_rfc3339();
        let success_int: i32 = if success { 1 } else { 0 };

        self.conn
            .execute(
                "INSERT INTO audit_log (timestamp, actor, action, object_kind, object_id, success, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![timestamp, actor, action, object_kind, object_id, success_int, detail],
            )
            .map_err(db_err)?;

        debug!("audit entry recorded");
        Ok(())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEntry> {
        Ok(AuditEntry {
            id: row.get(0)?,
            timestamp: row.get(1)?,
            actor: row.get(2)?,
            action: row.get(3)?,
            object_kind: row.get(4)?,
            object_id: row.get(5)?,
            success: row.get::<_, i32>(6)? != 0,
            detail: row.get(7)?,
        })
    }

    /// All entries for a given object, ordered by timestamp ascending.
    pub fn entries_for_object(&self, object_kind: &str, object_id: &str) -> Result<Vec<AuditEntry>, CoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, actor, action, object_kind, object_id, success, detail
                 FROM audit_log
                 WHERE object_kind = ?1 AND object_id = ?2
                 ORDER BY timestamp ASC",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![object_kind, object_id], Self::row_to_entry)
            .map_err(db_err)?;

        rows.map(|r| r.map_err(db_err)).collect()
    }

    /// The most recent `limit` entries, newest-first.
    pub fn recent_entries(&self, limit: u32) -> Result<Vec<AuditEntry>, CoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, timestamp, actor, action, object_kind, object_id, success, detail
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
            )
            .map_err(db_err)?;

        let rows = stmt.query_map(params![limit], Self::row_to_entry).map_err(db_err)?;
        rows.map(|r| r.map_err(db_err)).collect()
    }

    pub fn count(&self) -> Result<u64, CoreError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_log() -> AuditLog {
        AuditLog::open_in_memory().expect("open in-memory audit log")
    }

    #[test]
    fn record_and_count() {
        let log = make_log();
        assert_eq!(log.count().unwrap(), 0);

        log.record("alice", "create-printer", "printer", "1", true, None)
            .unwrap();
        log.record("alice", "cancel-job", "job", "abc", true, Some("user requested"))
            .unwrap();

        assert_eq!(log.count().unwrap(), 2);
    }

    #[test]
    fn entries_for_object() {
        let log = make_log();
        log.record("alice", "create-printer", "printer", "1", true, None)
            .unwrap();
        log.record("bob", "print-job", "job", "j1", true, None).unwrap();
        log.record("alice", "delete-printer", "printer", "1", false, Some("job in flight"))
            .unwrap();

        let entries = log.entries_for_object("printer", "1").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "create-printer");
        assert!(entries[0].success);
        assert_eq!(entries[1].action, "delete-printer");
        assert!(!entries[1].success);
    }

    #[test]
    fn recent_entries_ordering() {
        let log = make_log();
        for i in 0..5 {
            log.record("alice", "op", "job", &format!("j{i}"), true, None)
                .unwrap();
        }

        let recent = log.recent_entries(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert!(recent[0].id > recent[1].id);
        assert!(recent[1].id > recent[2].id);
    }

    #[test]
    fn state_round_trips_and_overwrites() {
        let log = make_log();
        assert!(log.load_state().unwrap().is_none());
        log.save_state("{\"a\":1}").unwrap();
        assert_eq!(log.load_state().unwrap().as_deref(), Some("{\"a\":1}"));
        log.save_state("{\"a\":2}").unwrap();
        assert_eq!(log.load_state().unwrap().as_deref(), Some("{\"a\":2}"));
    }

    #[test]
    fn failure_entry_records_detail() {
        let log = make_log();
        log.record("-", "authorize", "system", "-", false, Some("bad group"))
            .unwrap();

        let entries = log.entries_for_object("system", "-").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].success);
        assert_eq!(entries[0].detail.as_deref(), Some("bad group"));
    }
}
