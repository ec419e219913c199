use rusqlite::Connection;

use crate::error::Result;

/// Initialise the job, queue and settings schema in `conn`.
///
/// Safe to call on every startup; it uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS jobs (
            id            TEXT    NOT NULL PRIMARY KEY,
            name          TEXT    NOT NULL UNIQUE,
            gpu_ids       TEXT    NOT NULL DEFAULT '0',
            job_config    TEXT    NOT NULL,   -- opaque JSON blob
            created_at    TEXT    NOT NULL,
            updated_at    TEXT    NOT NULL,
            status        TEXT    NOT NULL DEFAULT 'stopped',
            stop          INTEGER NOT NULL DEFAULT 0,
            step          INTEGER NOT NULL DEFAULT 0,
            info          TEXT    NOT NULL DEFAULT '',
            speed_string  TEXT    NOT NULL DEFAULT ''
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs (status);

        -- No FK to jobs: orphaned rows are cleaned up by the queue worker.
        CREATE TABLE IF NOT EXISTS queue (
            id          TEXT NOT NULL PRIMARY KEY,
            job_id      TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'waiting',
            created_at  TEXT NOT NULL
        ) STRICT;

        -- Head-of-queue lookup: WHERE status = 'waiting' ORDER BY created_at
        CREATE INDEX IF NOT EXISTS idx_queue_head ON queue (status, created_at);
        CREATE INDEX IF NOT EXISTS idx_queue_job ON queue (job_id);

        CREATE TABLE IF NOT EXISTS settings (
            key    TEXT NOT NULL PRIMARY KEY,
            value  TEXT NOT NULL
        ) STRICT;
        ",
    )?;
    Ok(())
}
