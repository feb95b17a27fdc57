//! # rf-av
//!
//! External encoder management and artifact storage for reelforge.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache the path to ffmpeg.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Encoding** ([`Encoder`], [`FfmpegEncoder`]) -- turn one work item into
//!   one artifact, reporting failures as values.
//! - **Artifact storage** ([`ArtifactSink`], [`LocalSink`]) -- allocate output
//!   locations and derive public references for them.

pub mod command;
pub mod encoder;
pub mod sink;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use encoder::{
    build_args, EncodeFailure, EncodeResult, Encoder, EncodingProfile, FailureKind, FfmpegEncoder,
};
pub use sink::{ArtifactSink, LocalSink};
pub use tools::{ToolConfig, ToolInfo, ToolRegistry};
