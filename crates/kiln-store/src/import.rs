//! One-shot import of `Job` rows from another kiln / toolkit SQLite file.
//!
//! The source database is opened read-only and only its `Job` table is read.
//! Rows are copied one by one; a bad row is skipped and reported, never
//! aborting the rest of the batch.

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{types::Value, Connection, OpenFlags, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::JobStore;
use crate::types::{timestamp, Job, JobStatus};

/// Largest upload accepted by the import endpoint.
pub const MAX_IMPORT_BYTES: u64 = 100 * 1024 * 1024;

const ALLOWED_EXTENSIONS: [&str; 3] = [".db", ".sqlite", ".sqlite3"];

/// Outcome of an import run, returned verbatim to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub success: bool,
    pub imported: usize,
    pub skipped: usize,
    pub message: String,
}

/// Check the uploaded file's name and size before touching disk.
pub fn validate_upload(file_name: &str, size: u64) -> std::result::Result<(), String> {
    if size > MAX_IMPORT_BYTES {
        return Err("File too large. Maximum size is 100MB.".to_string());
    }
    if !ALLOWED_EXTENSIONS.iter().any(|ext| file_name.ends_with(ext)) {
        return Err("Invalid file type. Please select a SQLite database file \
                    (.db, .sqlite, or .sqlite3)."
            .to_string());
    }
    Ok(())
}

/// Replace every character outside `[A-Za-z0-9.-]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A `Job` row as read from the source file. Every column is optional so
/// older schemas still import.
#[derive(Debug, Default)]
struct SourceJob {
    id: Option<String>,
    name: Option<String>,
    gpu_ids: Option<String>,
    job_config: Option<String>,
    created_at: Option<Value>,
    updated_at: Option<Value>,
    status: Option<String>,
    stop: Option<Value>,
    step: Option<i64>,
    info: Option<String>,
    speed_string: Option<String>,
}

/// Copy every job from the SQLite file at `path` into `store`.
pub fn import_jobs(store: &dyn JobStore, path: &Path) -> Result<ImportReport> {
    let rows = read_source_jobs(path)?;

    if rows.is_empty() {
        return Ok(ImportReport {
            success: true,
            imported: 0,
            skipped: 0,
            message: "No jobs found in the database to import.".to_string(),
        });
    }

    let mut imported = 0usize;
    let mut skipped = 0usize;
    let mut errors: Vec<String> = Vec::new();

    for src in rows {
        let label = src.id.clone().unwrap_or_default();
        let (name, job_config) = match (src.name.as_deref(), src.job_config.as_deref()) {
            (Some(n), Some(c)) if !n.is_empty() && !c.is_empty() => (n.to_string(), c.to_string()),
            _ => {
                skipped += 1;
                errors.push(format!("Job with ID {label} is missing required fields"));
                continue;
            }
        };

        match store.find_job_by_name(&name) {
            Ok(Some(_)) => {
                skipped += 1;
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(job = %name, "name lookup failed during import: {e}");
                skipped += 1;
                errors.push(format!("Failed to import job \"{name}\": {e}"));
                continue;
            }
        }

        if serde_json::from_str::<serde_json::Value>(&job_config).is_err() {
            skipped += 1;
            errors.push(format!("Job \"{name}\" has invalid configuration data"));
            continue;
        }

        let job = to_job(&src, name.clone(), job_config);
        match store.insert_job(&job) {
            Ok(()) => imported += 1,
            Err(StoreError::DuplicateId { .. }) => {
                let retry = Job {
                    id: Uuid::new_v4().to_string(),
                    ..job
                };
                match store.insert_job(&retry) {
                    Ok(()) => imported += 1,
                    Err(_) => {
                        skipped += 1;
                        errors.push(format!("Failed to import job \"{name}\" due to conflicts"));
                    }
                }
            }
            Err(e) => {
                skipped += 1;
                errors.push(format!("Failed to import job \"{name}\": {e}"));
            }
        }
    }

    info!(imported, skipped, "job import finished");

    Ok(ImportReport {
        success: true,
        imported,
        skipped,
        message: summarize(imported, skipped, &errors),
    })
}

fn summarize(imported: usize, skipped: usize, errors: &[String]) -> String {
    let mut message = format!("Successfully imported {imported} jobs.");
    if skipped > 0 {
        message.push_str(&format!(
            " {skipped} jobs were skipped (duplicate names or errors)."
        ));
    }
    match errors.len() {
        0 => {}
        1..=3 => message.push_str(&format!(" Errors: {}", errors.join(", "))),
        _ => message.push_str(" Multiple errors occurred during import."),
    }
    message
}

fn read_source_jobs(path: &Path) -> Result<Vec<SourceJob>> {
    let invalid = || {
        StoreError::Import(
            "Invalid database file or corrupted database. \
             Please ensure this is a valid kiln database."
                .to_string(),
        )
    };

    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(|_| invalid())?;

    // A non-SQLite file opens fine; the first query is what fails.
    let has_job_table = conn
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'Job'",
            [],
            |r| r.get::<_, String>(0),
        )
        .optional()
        .map_err(|_| invalid())?
        .is_some();

    if !has_job_table {
        return Err(StoreError::Import(
            "Database does not contain a valid Job table. \
             This may not be a kiln database."
                .to_string(),
        ));
    }

    let mut stmt = conn
        .prepare("SELECT * FROM Job")
        .map_err(|e| StoreError::Import(format!("Failed to read jobs from database: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            Ok(SourceJob {
                id: text(row, "id"),
                name: text(row, "name"),
                gpu_ids: text(row, "gpu_ids"),
                job_config: text(row, "job_config"),
                created_at: row.get::<_, Value>("created_at").ok(),
                updated_at: row.get::<_, Value>("updated_at").ok(),
                status: text(row, "status"),
                stop: row.get::<_, Value>("stop").ok(),
                step: row.get::<_, Option<i64>>("step").ok().flatten(),
                info: text(row, "info"),
                speed_string: text(row, "speed_string"),
            })
        })
        .and_then(|mapped| mapped.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(|e| StoreError::Import(format!("Failed to read jobs from database: {e}")))?;

    Ok(rows)
}

/// Read a column as text, tolerating a missing column or a numeric value.
fn text(row: &rusqlite::Row<'_>, column: &str) -> Option<String> {
    match row.get::<_, Value>(column).ok()? {
        Value::Text(s) => Some(s),
        Value::Integer(i) => Some(i.to_string()),
        Value::Real(f) => Some(f.to_string()),
        Value::Null | Value::Blob(_) => None,
    }
}

fn to_job(src: &SourceJob, name: String, job_config: String) -> Job {
    let now = Utc::now();
    let status = src
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| match s.parse::<JobStatus>() {
            Ok(status) => Some(status),
            Err(e) => {
                warn!(job = %name, "{e}; importing as stopped");
                None
            }
        })
        .unwrap_or(JobStatus::Stopped);

    Job {
        id: src
            .id
            .clone()
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name,
        gpu_ids: non_empty(src.gpu_ids.clone()).unwrap_or_else(|| "0".to_string()),
        job_config,
        created_at: timestamp(parse_time(src.created_at.as_ref()).unwrap_or(now)),
        updated_at: timestamp(parse_time(src.updated_at.as_ref()).unwrap_or(now)),
        status,
        stop: matches!(src.stop, Some(Value::Integer(1))),
        step: src.step.unwrap_or(0),
        info: src.info.clone().unwrap_or_default(),
        speed_string: src.speed_string.clone().unwrap_or_default(),
    }
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|v| !v.is_empty())
}

/// Source timestamps are either RFC 3339 text or epoch milliseconds.
fn parse_time(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        Value::Integer(ms) => Utc.timestamp_millis_opt(*ms).single(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::SqliteStore;
    use crate::types::NewJob;

    fn source_db(rows: &[(&str, &str, &str)]) -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            "CREATE TABLE Job (
                id TEXT PRIMARY KEY, name TEXT, gpu_ids TEXT, job_config TEXT,
                created_at INTEGER, updated_at INTEGER, status TEXT,
                stop INTEGER, step INTEGER, info TEXT, speed_string TEXT
            );",
        )
        .unwrap();
        for (id, name, config) in rows {
            conn.execute(
                "INSERT INTO Job VALUES (?1, ?2, '1', ?3, 1767225600000, 1767225600000,
                                         'completed', 1, 42, 'done', '1.2 it/s')",
                rusqlite::params![id, name, config],
            )
            .unwrap();
        }
        file
    }

    #[test]
    fn imports_rows_and_keeps_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let src = source_db(&[("id-1", "flux-lora", r#"{"a":1}"#)]);

        let report = import_jobs(&store, src.path()).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.message, "Successfully imported 1 jobs.");

        let job = store.find_job("id-1").unwrap().unwrap();
        assert_eq!(job.name, "flux-lora");
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.stop);
        assert_eq!(job.step, 42);
        assert_eq!(job.created_at, "2026-01-01T00:00:00.000000Z");
    }

    #[test]
    fn skips_duplicate_names_and_bad_config() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .create_job(NewJob {
                name: "taken".to_string(),
                gpu_ids: "0".to_string(),
                job_config: "{}".to_string(),
            })
            .unwrap();
        let src = source_db(&[
            ("id-1", "taken", "{}"),
            ("id-2", "broken", "{not json"),
            ("id-3", "fresh", "{}"),
        ]);

        let report = import_jobs(&store, src.path()).unwrap();
        assert_eq!(report.imported, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(
            report.message,
            "Successfully imported 1 jobs. 2 jobs were skipped (duplicate names or errors). \
             Errors: Job \"broken\" has invalid configuration data"
        );
    }

    #[test]
    fn id_collision_gets_fresh_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        let existing = store
            .create_job(NewJob {
                name: "local".to_string(),
                gpu_ids: "0".to_string(),
                job_config: "{}".to_string(),
            })
            .unwrap();
        let src = source_db(&[(existing.id.as_str(), "remote", "{}")]);

        let report = import_jobs(&store, src.path()).unwrap();
        assert_eq!(report.imported, 1);
        let imported = store.find_job_by_name("remote").unwrap().unwrap();
        assert_ne!(imported.id, existing.id);
    }

    #[test]
    fn empty_table_reports_nothing_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let src = source_db(&[]);
        let report = import_jobs(&store, src.path()).unwrap();
        assert_eq!(report.imported, 0);
        assert_eq!(report.message, "No jobs found in the database to import.");
    }

    #[test]
    fn rejects_database_without_job_table() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
        Connection::open(file.path())
            .unwrap()
            .execute_batch("CREATE TABLE Other (x INTEGER);")
            .unwrap();
        let err = import_jobs(&store, file.path()).unwrap_err();
        assert!(err.to_string().contains("does not contain a valid Job table"));
    }

    #[test]
    fn rejects_non_sqlite_file() {
        let store = SqliteStore::open_in_memory().unwrap();
        let file = tempfile::Builder::new().suffix(".db").tempfile().unwrap();
        std::fs::write(file.path(), b"definitely not a database file, just text").unwrap();
        let err = import_jobs(&store, file.path()).unwrap_err();
        assert!(err.to_string().starts_with("Invalid database file"));
    }

    #[test]
    fn more_than_three_errors_are_collapsed() {
        let errors: Vec<String> = (0..4).map(|i| format!("e{i}")).collect();
        assert_eq!(
            summarize(0, 4, &errors),
            "Successfully imported 0 jobs. 4 jobs were skipped (duplicate names or errors). \
             Multiple errors occurred during import."
        );
    }

    #[test]
    fn upload_validation() {
        assert!(validate_upload("jobs.db", 10).is_ok());
        assert!(validate_upload("jobs.sqlite3", 10).is_ok());
        assert!(validate_upload("jobs.csv", 10).is_err());
        assert!(validate_upload("jobs.db", MAX_IMPORT_BYTES + 1).is_err());
        assert_eq!(sanitize_file_name("my jobs (1).db"), "my_jobs__1_.db");
    }

    /// Fails name lookups for one job, delegating everything else.
    struct FlakyLookup {
        inner: SqliteStore,
        broken_name: &'static str,
    }

    impl JobStore for FlakyLookup {
        fn find_running_jobs(&self) -> Result<Vec<Job>> {
            self.inner.find_running_jobs()
        }
        fn find_oldest_waiting_queue_entry(&self) -> Result<Option<crate::QueueEntry>> {
            self.inner.find_oldest_waiting_queue_entry()
        }
        fn find_job(&self, id: &str) -> Result<Option<Job>> {
            self.inner.find_job(id)
        }
        fn find_job_by_name(&self, name: &str) -> Result<Option<Job>> {
            if name == self.broken_name {
                return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
            }
            self.inner.find_job_by_name(name)
        }
        fn list_jobs(&self) -> Result<Vec<Job>> {
            self.inner.list_jobs()
        }
        fn delete_queue_entry(&self, id: &str) -> Result<()> {
            self.inner.delete_queue_entry(id)
        }
        fn update_job_status(&self, id: &str, status: JobStatus, info: &str) -> Result<bool> {
            self.inner.update_job_status(id, status, info)
        }
        fn create_job(&self, new: NewJob) -> Result<Job> {
            self.inner.create_job(new)
        }
        fn insert_job(&self, job: &Job) -> Result<()> {
            self.inner.insert_job(job)
        }
        fn delete_job(&self, id: &str) -> Result<bool> {
            self.inner.delete_job(id)
        }
        fn enqueue_at(&self, job_id: &str, created_at: DateTime<Utc>) -> Result<crate::QueueEntry> {
            self.inner.enqueue_at(job_id, created_at)
        }
        fn delete_queue_entries_for_job(&self, job_id: &str) -> Result<usize> {
            self.inner.delete_queue_entries_for_job(job_id)
        }
    }

    #[test]
    fn lookup_failure_skips_only_that_row() {
        let store = FlakyLookup {
            inner: SqliteStore::open_in_memory().unwrap(),
            broken_name: "cursed",
        };
        let src = source_db(&[
            ("id-1", "first", "{}"),
            ("id-2", "cursed", "{}"),
            ("id-3", "third", "{}"),
        ]);

        let report = import_jobs(&store, src.path()).unwrap();
        assert_eq!(report.imported, 2);
        assert_eq!(report.skipped, 1);
        assert!(report.message.contains("Failed to import job \"cursed\""), "{}", report.message);
        assert!(store.inner.find_job("id-3").unwrap().is_some());
    }
}
