//! Application configuration types.
//!
//! The top-level [`Config`] struct is deserialized from JSON and carries all
//! sub-configs for storage, tools, encoding, the transcode matrix and
//! concurrency limits. Every section defaults sensibly so a completely empty
//! `{}` file is valid. The value is read-only once loaded.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::media::{Geometry, OutputFormat, Resolution};
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub encoding: EncodingConfig,
    pub matrix: MatrixConfig,
    pub concurrency: ConcurrencyConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::Validation(format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.matrix.resolutions.is_empty() || self.matrix.formats.is_empty() {
            warnings.push("matrix is empty; jobs will complete with no artifacts".into());
        }

        let mut labels = HashSet::new();
        for res in &self.matrix.resolutions {
            if !labels.insert(res.label()) {
                warnings.push(format!(
                    "matrix.resolutions: duplicate label '{}' will be ignored",
                    res.label()
                ));
            }
            let size = res.size();
            if size.width == 0 || size.height == 0 {
                warnings.push(format!("matrix.resolutions: '{}' has a zero dimension", res.label()));
            } else if size.width % 2 != 0 || size.height % 2 != 0 {
                warnings.push(format!(
                    "matrix.resolutions: '{}' ({size}) has an odd dimension; most encoders require even sizes",
                    res.label()
                ));
            }
        }

        let mut formats = HashSet::new();
        for fmt in &self.matrix.formats {
            if !formats.insert(fmt.as_str()) {
                warnings.push(format!("matrix.formats: duplicate format '{fmt}' will be ignored"));
            }
        }

        for fmt in self.encoding.format_overrides.keys() {
            if !formats.contains(fmt.to_ascii_lowercase().as_str()) {
                warnings.push(format!(
                    "encoding.format_overrides: '{fmt}' is not in matrix.formats"
                ));
            }
        }

        if self.concurrency.workers_per_job == Some(0) {
            warnings.push("concurrency.workers_per_job is 0; using 1".into());
        }
        if self.concurrency.global_limit == Some(0) {
            warnings.push("concurrency.global_limit is 0; using 1".into());
        }

        if self.tools.timeout_secs == 0 {
            warnings.push("tools.timeout_secs is 0; every encode will time out".into());
        }

        if self.storage.public_base_url.trim().is_empty() {
            warnings.push("storage.public_base_url is empty; artifact URLs will be relative".into());
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Where artifacts, staged uploads and the job database live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory encoded artifacts are written to.
    pub output_dir: PathBuf,
    /// Directory uploads are staged in while a job runs.
    pub staging_dir: PathBuf,
    /// SQLite job registry.
    pub db_path: PathBuf,
    /// Prefix for artifact URLs; the artifact file name is appended.
    pub public_base_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("converted_videos"),
            staging_dir: PathBuf::from("converted_videos/.staging"),
            db_path: PathBuf::from("videos.db"),
            public_base_url: "http://localhost:8080/videos".into(),
        }
    }
}

/// Paths to external CLI tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    /// Per-invocation limit before an encode is reported as failed.
    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    86_400
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            timeout_secs: default_tool_timeout(),
        }
    }
}

/// Fixed encoding profile applied to every variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    #[serde(default = "default_video_preset")]
    pub video_preset: Option<String>,
    #[serde(default = "default_video_crf")]
    pub video_crf: u32,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    /// Codec substitutions for containers that cannot carry the base codecs.
    #[serde(default = "default_format_overrides")]
    pub format_overrides: BTreeMap<String, CodecOverride>,
}

/// Per-format replacement for parts of the base encoding profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecOverride {
    pub video_codec: Option<String>,
    /// `Some(None)` in JSON is expressed as `"video_preset": null` and drops
    /// the preset flag entirely.
    #[serde(default, with = "double_option", skip_serializing_if = "Option::is_none")]
    pub video_preset: Option<Option<String>>,
    pub audio_codec: Option<String>,
}

/// Distinguish a missing field from an explicit `null`.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            None => serializer.serialize_none(),
            Some(inner) => inner.serialize(serializer),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

fn default_video_codec() -> String {
    "libx264".into()
}
fn default_video_preset() -> Option<String> {
    Some("fast".into())
}
fn default_video_crf() -> u32 {
    23
}
fn default_audio_codec() -> String {
    "aac".into()
}
fn default_audio_bitrate() -> String {
    "128k".into()
}
fn default_format_overrides() -> BTreeMap<String, CodecOverride> {
    // The WebM muxer only accepts VP8/VP9/AV1 video and Vorbis/Opus audio.
    BTreeMap::from([(
        "webm".to_string(),
        CodecOverride {
            video_codec: Some("libvpx-vp9".into()),
            video_preset: Some(None),
            audio_codec: Some("libopus".into()),
        },
    )])
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            video_preset: default_video_preset(),
            video_crf: default_video_crf(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            format_overrides: default_format_overrides(),
        }
    }
}

/// The resolution x format matrix every upload is expanded into.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
    /// Ordered; the order here is the order artifacts are reported in.
    pub resolutions: Vec<Resolution>,
    pub formats: Vec<OutputFormat>,
}

impl Default for MatrixConfig {
    fn default() -> Self {
        let res = |label, w, h| Resolution::builtin(label, Geometry::new(w, h));
        let fmt = OutputFormat::builtin;
        Self {
            resolutions: vec![
                res("1080p", 1920, 1080),
                res("720p", 1280, 720),
                res("480p", 854, 480),
                res("360p", 640, 360),
            ],
            formats: vec![fmt("mp4"), fmt("avi"), fmt("mkv"), fmt("webm")],
        }
    }
}

/// Limits on simultaneous external-tool processes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Maximum encodes in flight for one job. Defaults to the CPU count.
    pub workers_per_job: Option<usize>,
    /// Maximum encodes in flight across all jobs. Defaults to the CPU count.
    pub global_limit: Option<usize>,
}

impl ConcurrencyConfig {
    pub fn effective_workers_per_job(&self) -> usize {
        self.workers_per_job.unwrap_or_else(num_cpus::get).max(1)
    }

    pub fn effective_global_limit(&self) -> usize {
        self.global_limit.unwrap_or_else(num_cpus::get).max(1)
    }
}
