//! Bounded-parallel execution of a job's work items.
//!
//! Each item runs in its own spawned task holding two permits: one from the
//! job's own semaphore and one from the process-wide [`ConcurrencyBudget`].
//! Results are gathered in dispatch order, so the report follows the
//! expander's canonical order regardless of which encode finishes first.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rf_av::{EncodeResult, Encoder, FailureKind};
use rf_core::{JobId, WorkItem};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::outcome::{classify, Artifact, ItemFailure, JobReport};

/// Process-wide cap on concurrent encoder invocations.
///
/// Clones share the same permits.
#[derive(Debug, Clone)]
pub struct ConcurrencyBudget {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

impl ConcurrencyBudget {
    /// Create a budget of `limit` permits (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    pub fn from_config(config: &rf_core::config::ConcurrencyConfig) -> Self {
        Self::new(config.effective_global_limit())
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Permits not currently held by any job.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// Removes the staged input when the run ends, however it ends.
struct InputCleanup(PathBuf);

impl Drop for InputCleanup {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => tracing::debug!("Removed staged input {}", self.0.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove staged input {}: {e}", self.0.display()),
        }
    }
}

/// What happened to one dispatched item.
enum ItemOutcome {
    Produced(PathBuf),
    Failed(FailureKind, String),
    Fatal(String),
}

/// Runs jobs against an [`Encoder`].
#[derive(Clone)]
pub struct Orchestrator {
    encoder: Arc<dyn Encoder>,
    budget: ConcurrencyBudget,
    workers_per_job: usize,
}

impl Orchestrator {
    pub fn new(encoder: Arc<dyn Encoder>, budget: ConcurrencyBudget, workers_per_job: usize) -> Self {
        Self {
            encoder,
            budget,
            workers_per_job: workers_per_job.max(1),
        }
    }

    pub fn budget(&self) -> &ConcurrencyBudget {
        &self.budget
    }

    pub fn workers_per_job(&self) -> usize {
        self.workers_per_job
    }

    /// Encode every item of a job and classify the result.
    ///
    /// Takes ownership of `input`: the file is deleted once every dispatched
    /// item has finished, or when this future is dropped. A
    /// [`FailureKind::ToolUnavailable`] result stops further dispatch;
    /// items already running are allowed to finish and anything they
    /// produced is deleted and reported as [`FailureKind::Discarded`].
    pub async fn run(&self, job_id: JobId, input: PathBuf, items: Vec<WorkItem>) -> JobReport {
        let _cleanup = InputCleanup(input.clone());
        let input = Arc::new(input);
        let job_permits = Arc::new(Semaphore::new(self.workers_per_job));
        let cancel = CancellationToken::new();

        tracing::info!(
            job_id = %job_id,
            items = items.len(),
            workers = self.workers_per_job,
            "Starting transcode job"
        );

        let mut handles: Vec<JoinHandle<ItemOutcome>> = Vec::with_capacity(items.len());

        for item in &items {
            let Some(permits) = self.acquire(&job_permits, &cancel).await else {
                break;
            };

            let encoder = self.encoder.clone();
            let input = input.clone();
            let cancel = cancel.clone();
            let job_id = job_id.clone();
            let item = item.clone();

            handles.push(tokio::spawn(async move {
                let _permits = permits;
                tracing::debug!(job_id = %job_id, variant = %item, "Encoding variant");
                let outcome = encode_one(encoder.as_ref(), &input, &job_id, &item).await;
                if let ItemOutcome::Fatal(ref msg) = outcome {
                    tracing::error!(job_id = %job_id, variant = %item, "Encoder unavailable, aborting job: {msg}");
                    cancel.cancel();
                }
                outcome
            }));
        }

        let dispatched = handles.len();
        let mut slots: Vec<std::result::Result<Artifact, ItemFailure>> =
            Vec::with_capacity(items.len());
        let mut fatal: Option<String> = None;

        for (item, handle) in items.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => ItemOutcome::Failed(
                    FailureKind::EncodeFailed,
                    format!("encode task did not finish: {e}"),
                ),
            };

            let slot = match outcome {
                ItemOutcome::Produced(location) => {
                    tracing::info!(job_id = %job_id, variant = %item, status = "succeeded", "Variant finished");
                    Ok(Artifact {
                        item: item.clone(),
                        location,
                    })
                }
                ItemOutcome::Failed(kind, diagnostic) => {
                    tracing::warn!(job_id = %job_id, variant = %item, status = "failed", "Variant failed: {diagnostic}");
                    Err(ItemFailure {
                        item: item.clone(),
                        kind,
                        diagnostic,
                    })
                }
                ItemOutcome::Fatal(diagnostic) => {
                    fatal.get_or_insert_with(|| diagnostic.clone());
                    Err(ItemFailure {
                        item: item.clone(),
                        kind: FailureKind::ToolUnavailable,
                        diagnostic,
                    })
                }
            };
            slots.push(slot);
        }

        for item in &items[dispatched..] {
            slots.push(Err(ItemFailure {
                item: item.clone(),
                kind: FailureKind::Skipped,
                diagnostic: "not started: job aborted".to_string(),
            }));
        }

        let succeeded = slots.iter().filter(|s| s.is_ok()).count();
        let status = classify(succeeded, items.len(), fatal.is_some());

        // An aborted job records nothing, so its finished files go too.
        if fatal.is_some() {
            for slot in &mut slots {
                if let Ok(artifact) = slot {
                    discard(&artifact.location);
                    let item = artifact.item.clone();
                    *slot = Err(ItemFailure {
                        item,
                        kind: FailureKind::Discarded,
                        diagnostic: "discarded: job aborted".to_string(),
                    });
                }
            }
        }

        let mut produced = Vec::with_capacity(succeeded);
        let mut failures = Vec::new();
        for slot in slots {
            match slot {
                Ok(artifact) => produced.push(artifact),
                Err(failure) => failures.push(failure),
            }
        }

        tracing::info!(
            job_id = %job_id,
            status = %status,
            produced = produced.len(),
            failed = failures.len(),
            "Transcode job finished"
        );

        JobReport {
            job_id,
            status,
            artifacts: produced,
            failures,
            fatal,
        }
    }

    /// Wait for a job slot and a global slot, unless the job is aborted first.
    async fn acquire(
        &self,
        job_permits: &Arc<Semaphore>,
        cancel: &CancellationToken,
    ) -> Option<(OwnedSemaphorePermit, OwnedSemaphorePermit)> {
        let job = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = job_permits.clone().acquire_owned() => permit.ok()?,
        };
        let global = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            permit = self.budget.semaphore.clone().acquire_owned() => permit.ok()?,
        };
        Some((job, global))
    }
}

async fn encode_one(encoder: &dyn Encoder, input: &Path, job_id: &JobId, item: &WorkItem) -> ItemOutcome {
    match encoder.encode(input, job_id, item).await {
        Ok(EncodeResult::Succeeded(location)) => ItemOutcome::Produced(location),
        Ok(EncodeResult::Failed(f)) => ItemOutcome::Failed(f.kind, f.diagnostic),
        Err(e) if e.is_fatal() => ItemOutcome::Fatal(e.to_string()),
        Err(e) => ItemOutcome::Failed(FailureKind::EncodeFailed, e.to_string()),
    }
}

fn discard(location: &Path) {
    match std::fs::remove_file(location) {
        Ok(()) => tracing::debug!("Discarded artifact {}", location.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to discard artifact {}: {e}", location.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use rf_core::{Geometry, JobStatus, OutputFormat, Resolution};

    use crate::matrix::expand;

    #[derive(Clone, Copy)]
    enum Script {
        Succeed,
        Fail,
        Unavailable,
        Panic,
    }

    /// Scripted encoder: behaviour and delay per `label/format`.
    #[derive(Default)]
    struct FakeEncoder {
        scripts: HashMap<String, Script>,
        delays: HashMap<String, Duration>,
        calls: Mutex<Vec<String>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeEncoder {
        fn with(mut self, variant: &str, script: Script) -> Self {
            self.scripts.insert(variant.to_string(), script);
            self
        }

        fn delay(mut self, variant: &str, d: Duration) -> Self {
            self.delays.insert(variant.to_string(), d);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Encoder for FakeEncoder {
        async fn encode(
            &self,
            _input: &Path,
            job_id: &JobId,
            item: &WorkItem,
        ) -> rf_core::Result<EncodeResult> {
            let key = item.to_string();
            self.calls.lock().unwrap().push(key.clone());

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let delay = self.delays.get(&key).copied().unwrap_or(Duration::from_millis(5));
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            match self.scripts.get(&key).copied().unwrap_or(Script::Succeed) {
                Script::Succeed => Ok(EncodeResult::Succeeded(PathBuf::from(format!(
                    "/nonexistent/out/{}",
                    item.output_name(job_id)
                )))),
                Script::Fail => Ok(EncodeResult::failed(
                    FailureKind::EncodeFailed,
                    "Unknown encoder 'libvpx-vp9'",
                )),
                Script::Unavailable => Err(rf_core::Error::tool_unavailable("ffmpeg", "not found")),
                Script::Panic => panic!("encoder crashed"),
            }
        }
    }

    fn scenario_items() -> Vec<WorkItem> {
        expand(
            &[
                Resolution::new("720p", Geometry::new(1280, 720)).unwrap(),
                Resolution::new("360p", Geometry::new(640, 360)).unwrap(),
            ],
            &[OutputFormat::new("mp4").unwrap(), OutputFormat::new("webm").unwrap()],
        )
    }

    fn staged_input(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("job.upload");
        std::fs::write(&path, b"fake media").unwrap();
        path
    }

    fn artifact_names(report: &JobReport) -> Vec<String> {
        report.artifacts.iter().map(|a| a.item.to_string()).collect()
    }

    #[tokio::test]
    async fn all_succeed_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let orch = Orchestrator::new(Arc::new(FakeEncoder::default()), ConcurrencyBudget::new(4), 4);

        let report = orch.run(JobId::new(), input.clone(), scenario_items()).await;

        assert_eq!(report.status, JobStatus::Complete);
        assert_eq!(
            artifact_names(&report),
            ["720p/mp4", "720p/webm", "360p/mp4", "360p/webm"]
        );
        assert!(report.failures.is_empty());
        assert!(report.fatal.is_none());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn one_failure_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = FakeEncoder::default().with("720p/webm", Script::Fail);
        let orch = Orchestrator::new(Arc::new(encoder), ConcurrencyBudget::new(4), 2);

        let report = orch.run(JobId::new(), input.clone(), scenario_items()).await;

        assert_eq!(report.status, JobStatus::PartiallyComplete);
        assert_eq!(artifact_names(&report), ["720p/mp4", "360p/mp4", "360p/webm"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item.to_string(), "720p/webm");
        assert_eq!(report.failures[0].kind, FailureKind::EncodeFailed);
        assert!(report.failures[0].diagnostic.contains("libvpx-vp9"));
        assert_eq!(report.failed_variants(), ["720p/webm"]);
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn all_fail_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let mut encoder = FakeEncoder::default();
        for item in scenario_items() {
            encoder = encoder.with(&item.to_string(), Script::Fail);
        }
        let orch = Orchestrator::new(Arc::new(encoder), ConcurrencyBudget::new(4), 4);

        let report = orch.run(JobId::new(), input.clone(), scenario_items()).await;

        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.artifacts.is_empty());
        assert_eq!(report.failures.len(), 4);
        assert!(report.fatal.is_none());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn empty_matrix_is_complete() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = Arc::new(FakeEncoder::default());
        let orch = Orchestrator::new(encoder.clone(), ConcurrencyBudget::new(4), 4);

        let report = orch.run(JobId::new(), input.clone(), Vec::new()).await;

        assert_eq!(report.status, JobStatus::Complete);
        assert!(report.artifacts.is_empty());
        assert!(encoder.calls().is_empty());
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn unavailable_tool_stops_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = Arc::new(FakeEncoder::default().with("720p/mp4", Script::Unavailable));
        let orch = Orchestrator::new(encoder.clone(), ConcurrencyBudget::new(4), 1);

        let report = orch.run(JobId::new(), input.clone(), scenario_items()).await;

        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.fatal.as_deref().unwrap_or("").contains("ffmpeg"));
        assert_eq!(encoder.calls(), ["720p/mp4"]);

        let kinds: Vec<FailureKind> = report.failures.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            [
                FailureKind::ToolUnavailable,
                FailureKind::Skipped,
                FailureKind::Skipped,
                FailureKind::Skipped
            ]
        );
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn unavailable_tool_discards_finished_variants() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = FakeEncoder::default()
            .with("720p/webm", Script::Unavailable)
            .delay("720p/webm", Duration::from_millis(50));
        let orch = Orchestrator::new(Arc::new(encoder), ConcurrencyBudget::new(4), 2);

        let report = orch.run(JobId::new(), input, scenario_items()).await;

        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.artifacts.is_empty());

        // Every variant is accounted for, still in canonical order.
        let names: Vec<String> = report.failures.iter().map(|f| f.item.to_string()).collect();
        assert_eq!(names, ["720p/mp4", "720p/webm", "360p/mp4", "360p/webm"]);
        assert_eq!(report.failures[0].kind, FailureKind::Discarded);
        assert_eq!(report.failures[0].diagnostic, "discarded: job aborted");
        assert_eq!(report.failures[1].kind, FailureKind::ToolUnavailable);
    }

    #[tokio::test]
    async fn panicking_item_is_recorded_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = FakeEncoder::default().with("360p/mp4", Script::Panic);
        let orch = Orchestrator::new(Arc::new(encoder), ConcurrencyBudget::new(4), 4);

        let report = orch.run(JobId::new(), input.clone(), scenario_items()).await;

        assert_eq!(report.status, JobStatus::PartiallyComplete);
        assert_eq!(artifact_names(&report), ["720p/mp4", "720p/webm", "360p/webm"]);
        assert_eq!(report.failures[0].kind, FailureKind::EncodeFailed);
        assert!(!input.exists());
    }

    #[tokio::test]
    async fn report_order_ignores_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let encoder = FakeEncoder::default()
            .delay("720p/mp4", Duration::from_millis(80))
            .delay("720p/webm", Duration::from_millis(40));
        let orch = Orchestrator::new(Arc::new(encoder), ConcurrencyBudget::new(4), 4);

        let report = orch.run(JobId::new(), input, scenario_items()).await;

        assert_eq!(
            artifact_names(&report),
            ["720p/mp4", "720p/webm", "360p/mp4", "360p/webm"]
        );
    }

    #[tokio::test]
    async fn per_job_limit_bounds_parallelism() {
        let dir = tempfile::tempdir().unwrap();
        let input = staged_input(&dir);
        let mut encoder = FakeEncoder::default();
        for item in scenario_items() {
            encoder = encoder.delay(&item.to_string(), Duration::from_millis(30));
        }
        let encoder = Arc::new(encoder);
        let orch = Orchestrator::new(encoder.clone(), ConcurrencyBudget::new(16), 2);

        orch.run(JobId::new(), input, scenario_items()).await;

        assert!(encoder.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(encoder.calls().len(), 4);
    }

    #[tokio::test]
    async fn global_budget_is_shared_across_jobs() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder = FakeEncoder::default();
        for item in scenario_items() {
            encoder = encoder.delay(&item.to_string(), Duration::from_millis(20));
        }
        let encoder = Arc::new(encoder);
        let budget = ConcurrencyBudget::new(1);
        let a = Orchestrator::new(encoder.clone(), budget.clone(), 4);
        let b = Orchestrator::new(encoder.clone(), budget.clone(), 4);

        let input_a = dir.path().join("a.upload");
        let input_b = dir.path().join("b.upload");
        std::fs::write(&input_a, b"a").unwrap();
        std::fs::write(&input_b, b"b").unwrap();

        let (ra, rb) = tokio::join!(
            a.run(JobId::new(), input_a, scenario_items()),
            b.run(JobId::new(), input_b, scenario_items()),
        );

        assert_eq!(ra.status, JobStatus::Complete);
        assert_eq!(rb.status, JobStatus::Complete);
        assert_eq!(encoder.peak.load(Ordering::SeqCst), 1);
        assert_eq!(budget.available(), 1);
    }

    #[tokio::test]
    async fn rerun_executes_every_item_again() {
        let dir = tempfile::tempdir().unwrap();
        let encoder = Arc::new(FakeEncoder::default());
        let orch = Orchestrator::new(encoder.clone(), ConcurrencyBudget::new(2), 2);
        let id = JobId::parse("same-job").unwrap();

        orch.run(id.clone(), staged_input(&dir), scenario_items()).await;
        orch.run(id, staged_input(&dir), scenario_items()).await;

        assert_eq!(encoder.calls().len(), 8);
    }

    #[test]
    fn budget_is_at_least_one() {
        let budget = ConcurrencyBudget::new(0);
        assert_eq!(budget.limit(), 1);
        assert_eq!(budget.available(), 1);
    }
}
