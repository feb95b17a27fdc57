//! Results of running a job.

use std::path::PathBuf;

use rf_av::FailureKind;
use rf_core::{JobId, JobStatus, WorkItem};
use serde::Serialize;

/// A variant that was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub item: WorkItem,
    /// Where the sink placed the file.
    pub location: PathBuf,
}

/// A variant that was not produced, with the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub item: WorkItem,
    pub kind: FailureKind,
    pub diagnostic: String,
}

/// Everything the orchestrator learned about one job.
///
/// `artifacts` and `failures` are both in the expander's canonical order.
#[derive(Debug, Clone, Serialize)]
pub struct JobReport {
    pub job_id: JobId,
    pub status: JobStatus,
    pub artifacts: Vec<Artifact>,
    pub failures: Vec<ItemFailure>,
    /// Set when the job was aborted by an environment fault.
    pub fatal: Option<String>,
}

impl JobReport {
    /// `label/format` names of the variants that were not produced.
    pub fn failed_variants(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.item.to_string()).collect()
    }
}

/// Classify a job from its item counts.
///
/// An aborted job is `Failed` no matter what it produced. A job with no
/// items has nothing left to do and is `Complete`.
pub(crate) fn classify(succeeded: usize, total: usize, aborted: bool) -> JobStatus {
    if aborted {
        JobStatus::Failed
    } else if succeeded == total {
        JobStatus::Complete
    } else if succeeded > 0 {
        JobStatus::PartiallyComplete
    } else {
        JobStatus::Failed
    }
}
