//! Single-variant encoding with ffmpeg.
//!
//! [`FfmpegEncoder`] runs one (resolution, format) conversion and folds the
//! outcome into an [`EncodeResult`]. Ordinary failures are values; only an
//! unavailable tool is returned as an error, since it dooms every sibling
//! variant as well.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rf_core::config::EncodingConfig;
use rf_core::{JobId, OutputFormat, WorkItem};

use crate::command::ToolCommand;
use crate::sink::ArtifactSink;
use crate::tools::ToolRegistry;

/// Why a single variant failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The encoder ran and reported an error, or timed out.
    EncodeFailed,
    /// The artifact location could not be prepared.
    SinkWriteError,
    /// The encoder binary could not be located or started.
    ToolUnavailable,
    /// Never dispatched because the job was aborted first.
    Skipped,
    /// Produced, then deleted because the job was aborted.
    Discarded,
}

/// Diagnostic for a failed variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeFailure {
    pub kind: FailureKind,
    pub diagnostic: String,
}

/// Outcome of encoding one work item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeResult {
    /// The artifact was written to this location.
    Succeeded(PathBuf),
    Failed(EncodeFailure),
}

impl EncodeResult {
    pub fn failed(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        Self::Failed(EncodeFailure {
            kind,
            diagnostic: diagnostic.into(),
        })
    }
}

/// Encodes one work item for a job.
///
/// Implementations return `Err` only for [`rf_core::Error::ToolUnavailable`];
/// every other failure is reported as [`EncodeResult::Failed`].
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn encode(
        &self,
        input: &Path,
        job_id: &JobId,
        item: &WorkItem,
    ) -> rf_core::Result<EncodeResult>;
}

/// The codec settings used for one output format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingProfile {
    pub video_codec: String,
    pub video_preset: Option<String>,
    pub video_crf: u32,
    pub audio_codec: String,
    pub audio_bitrate: String,
}

impl EncodingProfile {
    /// Resolve the base profile plus any override for `format`.
    pub fn for_format(config: &EncodingConfig, format: &OutputFormat) -> Self {
        let mut profile = Self {
            video_codec: config.video_codec.clone(),
            video_preset: config.video_preset.clone(),
            video_crf: config.video_crf,
            audio_codec: config.audio_codec.clone(),
            audio_bitrate: config.audio_bitrate.clone(),
        };

        let chosen = config
            .format_overrides
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(format.as_str()))
            .map(|(_, o)| o);
        if let Some(o) = chosen {
            if let Some(ref v) = o.video_codec {
                profile.video_codec = v.clone();
            }
            if let Some(ref p) = o.video_preset {
                profile.video_preset = p.clone();
            }
            if let Some(ref a) = o.audio_codec {
                profile.audio_codec = a.clone();
            }
        }

        profile
    }
}

/// Build the ffmpeg argument list for one variant.
///
/// Only the staged input path, the sink-allocated output path and values
/// from configuration appear here.
pub fn build_args(
    input: &Path,
    output: &Path,
    item: &WorkItem,
    profile: &EncodingProfile,
) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-nostdin".to_string(),
        "-i".to_string(),
        input.to_string_lossy().to_string(),
        "-vf".to_string(),
        item.geometry().scale_filter(),
        "-c:v".to_string(),
        profile.video_codec.clone(),
    ];
    if let Some(ref preset) = profile.video_preset {
        args.extend(["-preset".to_string(), preset.clone()]);
    }
    args.extend([
        "-crf".to_string(),
        profile.video_crf.to_string(),
        "-c:a".to_string(),
        profile.audio_codec.clone(),
        "-b:a".to_string(),
        profile.audio_bitrate.clone(),
        output.to_string_lossy().to_string(),
    ]);
    args
}

/// [`Encoder`] backed by the ffmpeg binary found in a [`ToolRegistry`].
pub struct FfmpegEncoder {
    tools: Arc<ToolRegistry>,
    sink: Arc<dyn ArtifactSink>,
    encoding: EncodingConfig,
}

impl FfmpegEncoder {
    pub fn new(
        tools: Arc<ToolRegistry>,
        sink: Arc<dyn ArtifactSink>,
        encoding: EncodingConfig,
    ) -> Self {
        Self {
            tools,
            sink,
            encoding,
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn encode(
        &self,
        input: &Path,
        job_id: &JobId,
        item: &WorkItem,
    ) -> rf_core::Result<EncodeResult> {
        let ffmpeg = self.tools.require("ffmpeg")?;

        let output = match self.sink.allocate(job_id, &item.output_name(job_id)) {
            Ok(location) => location,
            Err(e) => {
                tracing::warn!(job_id = %job_id, variant = %item, "Sink rejected artifact: {e}");
                return Ok(EncodeResult::failed(FailureKind::SinkWriteError, e.to_string()));
            }
        };

        let profile = EncodingProfile::for_format(&self.encoding, &item.format);
        tracing::info!(
            job_id = %job_id,
            variant = %item,
            "Encode: {:?} -> {:?} (vcodec={}, crf={}, preset={:?}, acodec={})",
            input,
            output,
            profile.video_codec,
            profile.video_crf,
            profile.video_preset,
            profile.audio_codec,
        );

        let mut cmd = ToolCommand::new(ffmpeg.path.clone());
        cmd.timeout(ffmpeg.timeout);
        cmd.args(build_args(input, &output, item, &profile));

        match cmd.execute().await {
            // The sink leaves an empty placeholder; only real bytes count.
            Ok(_) if has_content(&output) => Ok(EncodeResult::Succeeded(output)),
            Ok(_) => {
                remove_partial(&output);
                Ok(EncodeResult::failed(
                    FailureKind::EncodeFailed,
                    "encoder exited successfully but produced no output",
                ))
            }
            Err(e) => {
                remove_partial(&output);
                if e.is_fatal() {
                    return Err(e);
                }
                Ok(EncodeResult::failed(FailureKind::EncodeFailed, e.to_string()))
            }
        }
    }
}

fn has_content(output: &Path) -> bool {
    std::fs::metadata(output).map(|m| m.len() > 0).unwrap_or(false)
}

/// Delete whatever the encoder left behind for a failed variant.
fn remove_partial(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => tracing::debug!("Removed partial artifact {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove partial artifact {}: {e}", output.display()),
    }
}
