//! Persistent iteration journal backed by SQLite.
//!
//! Every completed iteration writes one row; the records survive across
//! runs so `status` can report on past sessions. Persistence failures are
//! reported to the caller and treated as non-fatal by the loop.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

/// SQLite database wrapper.
pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Open or initialize the journal database at the given path.
pub fn init_db(path: &str) -> Result<Db> {
    if let Some(parent) = Path::new(path).parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory for {}", path))?;
    }

    let conn =
        Connection::open(path).with_context(|| format!("Failed to open database at {}", path))?;

    conn.pragma_update(None, "journal_mode", "WAL")
        .context("Failed to enable WAL mode")?;

    let version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("Failed to read schema version")?;

    if version < SCHEMA_VERSION {
        migrate(&conn, version, SCHEMA_VERSION)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .context("Failed to record schema version")?;
    }

    Ok(Db { conn })
}

fn migrate(conn: &Connection, from_version: i32, to_version: i32) -> Result<()> {
    if from_version < 1 && to_version >= 1 {
        conn.execute_batch(
            r#"
            CREATE TABLE iterations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id TEXT NOT NULL,
                iteration INTEGER NOT NULL,
                backend TEXT,
                trigger_reason TEXT NOT NULL,
                success INTEGER NOT NULL,
                error TEXT,
                output_preview TEXT,
                duration_secs REAL NOT NULL DEFAULT 0,
                tokens_used INTEGER NOT NULL DEFAULT 0,
                cost REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX idx_iterations_run ON iterations(run_id, iteration);
            "#,
        )
        .context("Failed to create schema v1")?;
    }
    Ok(())
}

/// One journal row recording the outcome of a single iteration.
#[derive(Debug, Clone)]
pub struct JournalEntry {
    pub run_id: String,
    pub iteration: u32,
    pub backend: Option<String>,
    pub trigger_reason: String,
    pub success: bool,
    pub error: Option<String>,
    pub output_preview: Option<String>,
    pub duration_secs: f64,
    pub tokens_used: u64,
    pub cost: f64,
    pub created_at: String,
}

/// Number of output characters kept in the preview column.
pub const OUTPUT_PREVIEW_CHARS: usize = 500;

/// Truncate agent output to a storable preview, on a char boundary.
pub fn output_preview(output: &str) -> String {
    output.chars().take(OUTPUT_PREVIEW_CHARS).collect()
}

/// Insert a journal entry, returning the new rowid.
pub fn insert_entry(db: &Db, entry: &JournalEntry) -> Result<i64> {
    db.conn().execute(
        "INSERT INTO iterations (run_id, iteration, backend, trigger_reason, success,
         error, output_preview, duration_secs, tokens_used, cost, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        rusqlite::params![
            entry.run_id,
            entry.iteration,
            entry.backend,
            entry.trigger_reason,
            entry.success,
            entry.error,
            entry.output_preview,
            entry.duration_secs,
            entry.tokens_used as i64,
            entry.cost,
            entry.created_at,
        ],
    )?;
    Ok(db.conn().last_insert_rowid())
}

fn entry_from_row(row: &rusqlite::Row) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        run_id: row.get(0)?,
        iteration: row.get(1)?,
        backend: row.get(2)?,
        trigger_reason: row.get(3)?,
        success: row.get(4)?,
        error: row.get(5)?,
        output_preview: row.get(6)?,
        duration_secs: row.get(7)?,
        tokens_used: row.get::<_, i64>(8)? as u64,
        cost: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Get the last N entries for a run, oldest first.
pub fn query_recent(db: &Db, run_id: &str, limit: u32) -> Result<Vec<JournalEntry>> {
    let mut stmt = db.conn().prepare(
        "SELECT run_id, iteration, backend, trigger_reason, success,
                error, output_preview, duration_secs, tokens_used, cost, created_at
         FROM iterations
         WHERE run_id = ?1
         ORDER BY iteration DESC
         LIMIT ?2",
    )?;
    let rows = stmt.query_map(rusqlite::params![run_id, limit], entry_from_row)?;
    let mut entries: Vec<JournalEntry> = rows.filter_map(|r| r.ok()).collect();
    entries.reverse();
    Ok(entries)
}

/// The run id of the most recently written entry, if any.
pub fn latest_run_id(db: &Db) -> Result<Option<String>> {
    let mut stmt = db
        .conn()
        .prepare("SELECT run_id FROM iterations ORDER BY id DESC LIMIT 1")?;
    let mut rows = stmt.query([])?;
    match rows.next()? {
        Some(row) => Ok(Some(row.get(0)?)),
        None => Ok(None),
    }
}

/// Aggregate numbers for one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunTotals {
    pub iterations: u32,
    pub successes: u32,
    pub total_cost: f64,
    pub total_duration_secs: f64,
}

/// Sum up a run's journal rows.
pub fn run_totals(db: &Db, run_id: &str) -> Result<RunTotals> {
    db.conn()
        .query_row(
            "SELECT COUNT(*), COALESCE(SUM(success), 0),
                    COALESCE(SUM(cost), 0), COALESCE(SUM(duration_secs), 0)
             FROM iterations WHERE run_id = ?1",
            rusqlite::params![run_id],
            |row| {
                Ok(RunTotals {
                    iterations: row.get(0)?,
                    successes: row.get(1)?,
                    total_cost: row.get(2)?,
                    total_duration_secs: row.get(3)?,
                })
            },
        )
        .context("Failed to aggregate run totals")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_test_db() -> (NamedTempFile, Db) {
        let temp_file = NamedTempFile::new().unwrap();
        let db = init_db(temp_file.path().to_str().unwrap()).unwrap();
        (temp_file, db)
    }

    fn make_entry(run_id: &str, iteration: u32, success: bool) -> JournalEntry {
        JournalEntry {
            run_id: run_id.to_string(),
            iteration,
            backend: Some("acp".to_string()),
            trigger_reason: "previous_success".to_string(),
            success,
            error: if success {
                None
            } else {
                Some("backend exit code 1".to_string())
            },
            output_preview: Some(format!("output for iteration {}", iteration)),
            duration_secs: 12.5,
            tokens_used: 420,
            cost: 0.0042,
            created_at: format!("2026-08-30T10:{:02}:00Z", iteration),
        }
    }

    #[test]
    fn insert_and_read_back() {
        let (_tmp, db) = open_test_db();

        let id = insert_entry(&db, &make_entry("run-a", 1, true)).unwrap();
        assert!(id > 0);

        let entries = query_recent(&db, "run-a", 10).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.run_id, "run-a");
        assert_eq!(e.iteration, 1);
        assert_eq!(e.backend.as_deref(), Some("acp"));
        assert!(e.success);
        assert!(e.error.is_none());
        assert_eq!(e.tokens_used, 420);
        assert!((e.cost - 0.0042).abs() < 1e-9);
    }

    #[test]
    fn recent_is_chronological_and_scoped_to_run() {
        let (_tmp, db) = open_test_db();

        for i in 1..=6 {
            insert_entry(&db, &make_entry("run-a", i, true)).unwrap();
        }
        for i in 1..=2 {
            insert_entry(&db, &make_entry("run-b", i, true)).unwrap();
        }

        let entries = query_recent(&db, "run-a", 5).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(entries[0].iteration, 2);
        assert_eq!(entries[4].iteration, 6);
        assert!(entries.iter().all(|e| e.run_id == "run-a"));
    }

    #[test]
    fn totals_sum_the_run() {
        let (_tmp, db) = open_test_db();

        insert_entry(&db, &make_entry("run-a", 1, true)).unwrap();
        insert_entry(&db, &make_entry("run-a", 2, false)).unwrap();
        insert_entry(&db, &make_entry("run-a", 3, true)).unwrap();
        insert_entry(&db, &make_entry("run-other", 1, true)).unwrap();

        let totals = run_totals(&db, "run-a").unwrap();
        assert_eq!(totals.iterations, 3);
        assert_eq!(totals.successes, 2);
        assert!((totals.total_cost - 0.0126).abs() < 1e-9);
        assert!((totals.total_duration_secs - 37.5).abs() < 1e-9);
    }

    #[test]
    fn latest_run_id_tracks_last_insert() {
        let (_tmp, db) = open_test_db();
        assert_eq!(latest_run_id(&db).unwrap(), None);

        insert_entry(&db, &make_entry("run-a", 1, true)).unwrap();
        insert_entry(&db, &make_entry("run-b", 1, true)).unwrap();
        assert_eq!(latest_run_id(&db).unwrap().as_deref(), Some("run-b"));
    }

    #[test]
    fn totals_for_unknown_run_are_zero() {
        let (_tmp, db) = open_test_db();
        let totals = run_totals(&db, "run-missing").unwrap();
        assert_eq!(totals.iterations, 0);
        assert_eq!(totals.successes, 0);
        assert_eq!(totals.total_cost, 0.0);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        let long = "é".repeat(OUTPUT_PREVIEW_CHARS + 100);
        let preview = output_preview(&long);
        assert_eq!(preview.chars().count(), OUTPUT_PREVIEW_CHARS);

        let short = "small output";
        assert_eq!(output_preview(short), short);
    }

    #[test]
    fn reopening_keeps_data() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();
        {
            let db = init_db(&path).unwrap();
            insert_entry(&db, &make_entry("run-a", 1, true)).unwrap();
        }
        let db = init_db(&path).unwrap();
        let entries = query_recent(&db, "run-a", 10).unwrap();
        assert_eq!(entries.len(), 1);
    }
}
