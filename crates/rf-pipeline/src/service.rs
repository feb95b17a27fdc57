//! The job submission API.
//!
//! [`TranscodeService`] stages an upload under a name derived only from its
//! [`JobId`], runs the configured matrix through the [`Orchestrator`], and
//! records the manifest of every job that produced something.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rf_av::{ArtifactSink, FfmpegEncoder, LocalSink, ToolRegistry};
use rf_core::config::Config;
use rf_core::{Error, JobId, JobStatus, Result, WorkItem};
use rf_db::{JobRecord, JobRegistry};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::matrix::expand;
use crate::orchestrator::{ConcurrencyBudget, Orchestrator};
use crate::outcome::ItemFailure;

/// What a caller gets back from a submission.
///
/// For a `Failed` job `urls` is empty and `job_id` cannot be looked up.
#[derive(Debug, Clone, Serialize)]
pub struct Submission {
    pub job_id: JobId,
    pub status: JobStatus,
    pub urls: Vec<String>,
    pub failures: Vec<ItemFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct TranscodeService {
    staging_dir: PathBuf,
    items: Vec<WorkItem>,
    orchestrator: Orchestrator,
    registry: JobRegistry,
    sink: Arc<dyn ArtifactSink>,
    /// Ids currently being staged or encoded; not yet in the registry.
    in_flight: Mutex<HashSet<JobId>>,
}

/// Holds a job id in the in-flight set until dropped.
struct Reservation<'a> {
    in_flight: &'a Mutex<HashSet<JobId>>,
    job_id: JobId,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.job_id);
    }
}

impl TranscodeService {
    pub fn new(
        config: &Config,
        orchestrator: Orchestrator,
        registry: JobRegistry,
        sink: Arc<dyn ArtifactSink>,
    ) -> Self {
        Self {
            staging_dir: config.storage.staging_dir.clone(),
            items: expand(&config.matrix.resolutions, &config.matrix.formats),
            orchestrator,
            registry,
            sink,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Wire up ffmpeg, the local sink and the on-disk registry from `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let sink: Arc<dyn ArtifactSink> = Arc::new(LocalSink::from_config(&config.storage));
        let encoder = Arc::new(FfmpegEncoder::new(
            tools,
            sink.clone(),
            config.encoding.clone(),
        ));
        let orchestrator = Orchestrator::new(
            encoder,
            ConcurrencyBudget::from_config(&config.concurrency),
            config.concurrency.effective_workers_per_job(),
        );

        let pool = rf_db::pool::init_pool(&config.storage.db_path)?;

        Ok(Self::new(config, orchestrator, JobRegistry::new(pool), sink))
    }

    /// The work items every submission is expanded into.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Submit an upload under a freshly generated id.
    pub async fn submit<R>(&self, reader: R, original_filename: &str) -> Result<Submission>
    where
        R: AsyncRead + Unpin,
    {
        self.run_job(JobId::new(), reader, original_filename).await
    }

    /// Submit an upload under a caller-chosen id.
    ///
    /// Returns [`Error::DuplicateJob`] before anything is staged or encoded
    /// if the id has already been recorded or another submission with the
    /// same id is still running.
    pub async fn submit_with_id<R>(
        &self,
        job_id: JobId,
        reader: R,
        original_filename: &str,
    ) -> Result<Submission>
    where
        R: AsyncRead + Unpin,
    {
        self.run_job(job_id, reader, original_filename).await
    }

    /// Submit a local file, recording its file name as the original name.
    pub async fn submit_path(&self, path: &Path) -> Result<Submission> {
        let original_filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::Validation(format!("not a file path: {}", path.display())))?;
        let file = tokio::fs::File::open(path).await?;
        self.submit(file, &original_filename).await
    }

    /// Fetch the manifest of a recorded job, or [`Error::NotFound`].
    pub fn lookup(&self, job_id: &JobId) -> Result<JobRecord> {
        self.registry.get(job_id)
    }

    /// Recorded jobs, newest first.
    pub fn list(&self, offset: i64, limit: i64) -> Result<Vec<JobRecord>> {
        self.registry.list(offset, limit)
    }

    async fn run_job<R>(&self, job_id: JobId, mut reader: R, original_filename: &str) -> Result<Submission>
    where
        R: AsyncRead + Unpin,
    {
        if original_filename.trim().is_empty() {
            return Err(Error::Validation("original filename must not be empty".into()));
        }

        let _reservation = self.reserve(&job_id)?;
        let staged = self.stage(&job_id, &mut reader).await?;
        tracing::info!(job_id = %job_id, original_filename, "Accepted upload");

        let report = self
            .orchestrator
            .run(job_id.clone(), staged, self.items.clone())
            .await;

        let urls = report
            .artifacts
            .iter()
            .map(|a| self.sink.public_reference(&a.location))
            .collect::<Result<Vec<_>>>()?;

        if report.status.is_persistable() {
            self.registry.create(
                &job_id,
                original_filename,
                report.status,
                &urls,
                &report.failed_variants(),
            )?;
        } else {
            tracing::warn!(job_id = %job_id, "Job produced no artifacts; nothing recorded");
        }

        Ok(Submission {
            job_id,
            status: report.status,
            urls,
            failures: report.failures,
            error: report.fatal,
        })
    }

    /// Claim `job_id` for this submission.
    ///
    /// The in-flight check and the registry check happen under one lock, so
    /// at most one submission per id gets past this point.
    fn reserve(&self, job_id: &JobId) -> Result<Reservation<'_>> {
        let mut in_flight = self.in_flight.lock();
        if in_flight.contains(job_id) || self.registry.exists(job_id)? {
            return Err(Error::DuplicateJob(job_id.to_string()));
        }
        in_flight.insert(job_id.clone());
        Ok(Reservation {
            in_flight: &self.in_flight,
            job_id: job_id.clone(),
        })
    }

    /// Stream the upload to `{staging_dir}/{job_id}.upload`.
    async fn stage<R>(&self, job_id: &JobId, reader: &mut R) -> Result<PathBuf>
    where
        R: AsyncRead + Unpin,
    {
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        let path = self.staging_dir.join(format!("{job_id}.upload"));

        let copied = async {
            let mut file = tokio::fs::File::create(&path).await?;
            let bytes = tokio::io::copy(reader, &mut file).await?;
            file.flush().await?;
            Ok::<u64, std::io::Error>(bytes)
        }
        .await;

        match copied {
            Ok(bytes) => {
                tracing::debug!(job_id = %job_id, bytes, "Staged upload at {}", path.display());
                Ok(path)
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    if rm.kind() != std::io::ErrorKind::NotFound {
                        tracing::warn!("Failed to remove partial upload {}: {rm}", path.display());
                    }
                }
                Err(e.into())
            }
        }
    }
}
