//! # rf-pipeline
//!
//! Job orchestration for reelforge.
//!
//! This crate provides:
//!
//! - **[`expand`]** -- turn the configured resolutions and formats into the
//!   ordered list of [`WorkItem`](rf_core::WorkItem)s for a job.
//! - **[`Orchestrator`]** -- run an [`Encoder`](rf_av::Encoder) over every
//!   work item with bounded parallelism and classify the outcome.
//! - **[`ConcurrencyBudget`]** -- the process-wide cap on concurrent encoder
//!   invocations shared by all jobs.
//! - **[`TranscodeService`]** -- the submission API: stage an upload, run the
//!   job, record its manifest, and look jobs up again.

pub mod matrix;
pub mod orchestrator;
pub mod outcome;
pub mod service;

// Re-export key types at the crate root.
pub use matrix::expand;
pub use orchestrator::{ConcurrencyBudget, Orchestrator};
pub use outcome::{Artifact, ItemFailure, JobReport};
pub use service::{Submission, TranscodeService};
