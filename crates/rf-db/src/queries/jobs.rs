//! Transcode job manifest operations.

use chrono::Utc;
use rusqlite::{Connection, ErrorCode};
use rf_core::{Error, JobId, JobStatus, Result};

use crate::models::JobRecord;

const COLS: &str = "id, original_filename, status, artifacts, failed_variants, created_at";

/// Record a finished job.
///
/// Jobs that produced nothing are never written; an id that is already
/// present is rejected with [`Error::DuplicateJob`] and the existing row is
/// left untouched.
pub fn create_job(
    conn: &Connection,
    id: &JobId,
    original_filename: &str,
    status: JobStatus,
    artifacts: &[String],
    failed_variants: &[String],
) -> Result<JobRecord> {
    if !status.is_persistable() {
        return Err(Error::Validation(format!(
            "job {id} produced no artifacts and cannot be recorded"
        )));
    }

    let now = Utc::now().to_rfc3339();
    let artifacts_json =
        serde_json::to_string(artifacts).map_err(|e| Error::database(e.to_string()))?;
    let failed_json =
        serde_json::to_string(failed_variants).map_err(|e| Error::database(e.to_string()))?;

    conn.execute(
        "INSERT INTO transcode_jobs (id, original_filename, status, artifacts, failed_variants, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.as_str(),
            original_filename,
            status.to_string(),
            &artifacts_json,
            &failed_json,
            &now
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref f, _) if f.code == ErrorCode::ConstraintViolation => {
            Error::DuplicateJob(id.to_string())
        }
        other => Error::database(other.to_string()),
    })?;

    Ok(JobRecord {
        id: id.clone(),
        original_filename: original_filename.to_string(),
        status,
        artifacts: artifacts.to_vec(),
        failed_variants: failed_variants.to_vec(),
        created_at: now,
    })
}

/// Get a job manifest by ID.
pub fn get_job(conn: &Connection, id: &JobId) -> Result<Option<JobRecord>> {
    let q = format!("SELECT {COLS} FROM transcode_jobs WHERE id = ?1");
    let result = conn.query_row(&q, [id.as_str()], JobRecord::from_row);
    match result {
        Ok(j) => Ok(Some(j)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(Error::database(e.to_string())),
    }
}

/// Whether a job with this ID has been recorded.
pub fn job_exists(conn: &Connection, id: &JobId) -> Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM transcode_jobs WHERE id = ?1",
        [id.as_str()],
        |row| row.get(0),
    )
    .map_err(|e| Error::database(e.to_string()))
}

/// List recorded jobs, newest first.
pub fn list_jobs(conn: &Connection, offset: i64, limit: i64) -> Result<Vec<JobRecord>> {
    let q = format!(
        "SELECT {COLS} FROM transcode_jobs
         ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2"
    );
    let mut stmt = conn
        .prepare(&q)
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map(rusqlite::params![limit, offset], JobRecord::from_row)
        .map_err(|e| Error::database(e.to_string()))?;
    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))
}

/// Count recorded jobs.
pub fn count_jobs(conn: &Connection) -> Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM transcode_jobs", [], |row| row.get(0))
        .map_err(|e| Error::database(e.to_string()))
}
