//! Database model types.
//!
//! Each model implements `from_row` for constructing itself from a
//! `rusqlite::Row`.

use rf_core::{JobId, JobStatus};
use serde::Serialize;

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

fn conversion_failure<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

/// Parse a validated job id from a text column.
fn parse_job_id(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<JobId> {
    let s: String = row.get(idx)?;
    JobId::parse(&s).map_err(|e| conversion_failure(idx, e))
}

/// Parse a JSON array of strings from a text column.
fn parse_string_list(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let s: String = row.get(idx)?;
    serde_json::from_str(&s).map_err(|e| conversion_failure(idx, e))
}

// ---------------------------------------------------------------------------
// JobRecord
// ---------------------------------------------------------------------------

/// The persisted manifest of a finished job.
///
/// `artifacts` are public references in matrix order; `failed_variants`
/// are `label/format` names of the variants that did not produce output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub original_filename: String,
    pub status: JobStatus,
    pub artifacts: Vec<String>,
    pub failed_variants: Vec<String>,
    pub created_at: String,
}

impl JobRecord {
    pub fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        let status: String = row.get(2)?;
        Ok(Self {
            id: parse_job_id(row, 0)?,
            original_filename: row.get(1)?,
            status: status.parse::<JobStatus>().map_err(|e| conversion_failure(2, e))?,
            artifacts: parse_string_list(row, 3)?,
            failed_variants: parse_string_list(row, 4)?,
            created_at: row.get(5)?,
        })
    }
}
