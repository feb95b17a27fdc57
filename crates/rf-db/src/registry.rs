//! Job registry facade over the connection pool.

use rf_core::{Error, JobId, JobStatus, Result};

use crate::models::JobRecord;
use crate::pool::{get_conn, DbPool};
use crate::queries::jobs;

/// Durable record of finished jobs, keyed by [`JobId`].
///
/// Cheap to clone; every clone shares the same pool.
#[derive(Clone)]
pub struct JobRegistry {
    pool: DbPool,
}

impl JobRegistry {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Record a job's manifest. See [`jobs::create_job`].
    pub fn create(
        &self,
        id: &JobId,
        original_filename: &str,
        status: JobStatus,
        artifacts: &[String],
        failed_variants: &[String],
    ) -> Result<JobRecord> {
        let conn = get_conn(&self.pool)?;
        let record = jobs::create_job(
            &conn,
            id,
            original_filename,
            status,
            artifacts,
            failed_variants,
        )?;
        tracing::info!(job_id = %id, status = %status, "Recorded job manifest");
        Ok(record)
    }

    /// Fetch a job's manifest, or [`Error::NotFound`].
    pub fn get(&self, id: &JobId) -> Result<JobRecord> {
        let conn = get_conn(&self.pool)?;
        jobs::get_job(&conn, id)?.ok_or_else(|| Error::not_found("job", id))
    }

    pub fn exists(&self, id: &JobId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        jobs::job_exists(&conn, id)
    }

    /// Recorded jobs, newest first.
    pub fn list(&self, offset: i64, limit: i64) -> Result<Vec<JobRecord>> {
        let conn = get_conn(&self.pool)?;
        jobs::list_jobs(&conn, offset, limit)
    }

    pub fn count(&self) -> Result<i64> {
        let conn = get_conn(&self.pool)?;
        jobs::count_jobs(&conn)
    }
}
