use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::store::{JobStore, SettingsStore};
use crate::types::{timestamp, Job, JobStatus, NewJob, QueueEntry, QueueStatus};

const JOB_COLUMNS: &str = "id, name, gpu_ids, job_config, created_at, updated_at,
                           status, stop, step, info, speed_string";

/// SQLite-backed [`JobStore`] and [`SettingsStore`].
///
/// Wraps a single connection in a `Mutex`. Every subsystem that needs its own
/// handle opens a fresh connection to the same file.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, initialising the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::new(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn insert_job_row(db: &Connection, job: &Job) -> Result<()> {
        db.execute(
            "INSERT INTO jobs
             (id, name, gpu_ids, job_config, created_at, updated_at,
              status, stop, step, info, speed_string)
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11)",
            rusqlite::params![
                job.id,
                job.name,
                job.gpu_ids,
                job.job_config,
                job.created_at,
                job.updated_at,
                job.status.as_str(),
                job.stop,
                job.step,
                job.info,
                job.speed_string,
            ],
        )
        .map_err(|e| classify_insert_error(e, job))?;
        Ok(())
    }
}

impl JobStore for SqliteStore {
    #[instrument(skip(self))]
    fn find_running_jobs(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE status = 'running'"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    fn find_oldest_waiting_queue_entry(&self) -> Result<Option<QueueEntry>> {
        let db = self.db.lock().unwrap();
        let entry = db
            .query_row(
                "SELECT id, job_id, status, created_at FROM queue
                 WHERE status = 'waiting'
                 ORDER BY created_at ASC, rowid ASC
                 LIMIT 1",
                [],
                row_to_queue_entry,
            )
            .optional()?;
        Ok(entry)
    }

    #[instrument(skip(self))]
    fn find_job(&self, id: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        let job = db
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                [id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    #[instrument(skip(self))]
    fn find_job_by_name(&self, name: &str) -> Result<Option<Job>> {
        let db = self.db.lock().unwrap();
        let job = db
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE name = ?1"),
                [name],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn list_jobs(&self) -> Result<Vec<Job>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY created_at, rowid"
        ))?;
        let jobs = stmt
            .query_map([], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    #[instrument(skip(self))]
    fn delete_queue_entry(&self, id: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM queue WHERE id = ?1", [id])?;
        if n == 0 {
            debug!(queue_id = %id, "queue entry already gone");
        }
        Ok(())
    }

    #[instrument(skip(self, info))]
    fn update_job_status(&self, id: &str, status: JobStatus, info: &str) -> Result<bool> {
        let now = timestamp(Utc::now());
        let db = self.db.lock().unwrap();
        let n = db.execute(
            "UPDATE jobs SET status = ?1, info = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status.as_str(), info, now, id],
        )?;
        if n == 0 {
            warn!(job_id = %id, %status, "status update skipped: job no longer exists");
            return Ok(false);
        }
        Ok(true)
    }

    fn create_job(&self, new: NewJob) -> Result<Job> {
        let now = timestamp(Utc::now());
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: new.name,
            gpu_ids: new.gpu_ids,
            job_config: new.job_config,
            created_at: now.clone(),
            updated_at: now,
            status: JobStatus::Stopped,
            stop: false,
            step: 0,
            info: String::new(),
            speed_string: String::new(),
        };
        let db = self.db.lock().unwrap();
        Self::insert_job_row(&db, &job)?;
        info!(job_id = %job.id, name = %job.name, "job created");
        Ok(job)
    }

    fn insert_job(&self, job: &Job) -> Result<()> {
        let db = self.db.lock().unwrap();
        Self::insert_job_row(&db, job)
    }

    fn delete_job(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM jobs WHERE id = ?1", [id])?;
        if n > 0 {
            info!(job_id = %id, "job deleted");
        }
        Ok(n > 0)
    }

    fn enqueue_at(&self, job_id: &str, created_at: DateTime<Utc>) -> Result<QueueEntry> {
        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            status: QueueStatus::Waiting,
            created_at: timestamp(created_at),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO queue (id, job_id, status, created_at) VALUES (?1,?2,?3,?4)",
            rusqlite::params![entry.id, entry.job_id, entry.status.as_str(), entry.created_at],
        )?;
        info!(queue_id = %entry.id, job_id = %job_id, "job enqueued");
        Ok(entry)
    }

    fn delete_queue_entries_for_job(&self, job_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM queue WHERE job_id = ?1", [job_id])?;
        Ok(n)
    }
}

impl SettingsStore for SqliteStore {
    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let value = db
            .query_row("SELECT value FROM settings WHERE key = ?1", [key], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare("SELECT key, value FROM settings ORDER BY key")?;
        let rows = stmt
            .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn upsert_setting(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }
}

/// Map a `jobs` row (selected with [`JOB_COLUMNS`]) to a `Job`.
fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status_str: String = row.get(6)?;
    let status = status_str.parse::<JobStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Job {
        id: row.get(0)?,
        name: row.get(1)?,
        gpu_ids: row.get(2)?,
        job_config: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        status,
        stop: row.get(7)?,
        step: row.get(8)?,
        info: row.get(9)?,
        speed_string: row.get(10)?,
    })
}

fn row_to_queue_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueueEntry> {
    Ok(QueueEntry {
        id: row.get(0)?,
        job_id: row.get(1)?,
        status: QueueStatus::from(row.get::<_, String>(2)?),
        created_at: row.get(3)?,
    })
}

/// Turn UNIQUE violations on `jobs` into typed errors.
fn classify_insert_error(e: rusqlite::Error, job: &Job) -> StoreError {
    if let rusqlite::Error::SqliteFailure(ref err, Some(ref msg)) = e {
        if err.code == ErrorCode::ConstraintViolation {
            if msg.contains("jobs.name") {
                return StoreError::DuplicateName {
                    name: job.name.clone(),
                };
            }
            if msg.contains("jobs.id") {
                return StoreError::DuplicateId { id: job.id.clone() };
            }
        }
    }
    StoreError::Database(e)
}
