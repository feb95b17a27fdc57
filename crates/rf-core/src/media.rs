//! Media-domain types describing the transcode matrix.
//!
//! A [`WorkItem`] pairs a [`Resolution`] (label plus [`Geometry`]) with an
//! [`OutputFormat`]. Labels and formats end up in artifact file names, so
//! both are validated to a path-safe alphabet when constructed or
//! deserialized. [`JobStatus`] classifies a finished job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::ids::JobId;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// Output frame size in pixels, written as `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

impl Geometry {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// The ffmpeg video filter that scales to this geometry.
    pub fn scale_filter(&self) -> String {
        format!("scale={}x{}", self.width, self.height)
    }
}

impl fmt::Display for Geometry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Geometry {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .split_once(['x', 'X'])
            .ok_or_else(|| Error::Validation(format!("geometry {s:?} is not WIDTHxHEIGHT")))?;
        let width = w
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid width in geometry {s:?}")))?;
        let height = h
            .trim()
            .parse()
            .map_err(|_| Error::Validation(format!("invalid height in geometry {s:?}")))?;
        Ok(Self { width, height })
    }
}

impl TryFrom<String> for Geometry {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Geometry> for String {
    fn from(g: Geometry) -> Self {
        g.to_string()
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// A named output resolution such as `720p -> 1280x720`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawResolution")]
pub struct Resolution {
    label: String,
    size: Geometry,
}

#[derive(Deserialize)]
struct RawResolution {
    label: String,
    size: Geometry,
}

impl TryFrom<RawResolution> for Resolution {
    type Error = Error;

    fn try_from(raw: RawResolution) -> Result<Self> {
        Self::new(raw.label, raw.size)
    }
}

impl Resolution {
    /// Create a resolution, validating that the label is path-safe.
    pub fn new(label: impl Into<String>, size: Geometry) -> Result<Self> {
        let label = label.into();
        if label.is_empty() || !label.chars().all(is_name_char) {
            return Err(Error::Validation(format!(
                "resolution label {label:?} must be non-empty and use [A-Za-z0-9_-]"
            )));
        }
        Ok(Self { label, size })
    }

    /// Built-in table entries; the label is known to be valid.
    pub(crate) fn builtin(label: &'static str, size: Geometry) -> Self {
        Self {
            label: label.to_string(),
            size,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> Geometry {
        self.size
    }
}

// ---------------------------------------------------------------------------
// OutputFormat
// ---------------------------------------------------------------------------

/// Output container format, used verbatim as the artifact file extension.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OutputFormat(String);

impl OutputFormat {
    /// Create a format. Formats are lowercase ASCII alphanumerics, 1-16 chars.
    pub fn new(s: impl Into<String>) -> Result<Self> {
        let s = s.into().to_ascii_lowercase();
        if s.is_empty() || s.len() > 16 || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::Validation(format!(
                "output format {s:?} must be 1-16 ASCII alphanumerics"
            )));
        }
        Ok(Self(s))
    }

    pub(crate) fn builtin(s: &'static str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OutputFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for OutputFormat {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

impl From<OutputFormat> for String {
    fn from(f: OutputFormat) -> Self {
        f.0
    }
}

// ---------------------------------------------------------------------------
// WorkItem
// ---------------------------------------------------------------------------

/// One (resolution, format) conversion within a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub resolution: Resolution,
    pub format: OutputFormat,
}

impl WorkItem {
    pub fn new(resolution: Resolution, format: OutputFormat) -> Self {
        Self { resolution, format }
    }

    /// Deterministic artifact name: `{job_id}_{label}.{format}`.
    pub fn output_name(&self, job_id: &JobId) -> String {
        format!("{}_{}.{}", job_id, self.resolution.label(), self.format)
    }

    pub fn geometry(&self) -> Geometry {
        self.resolution.size()
    }
}

/// Renders as `label/format`, e.g. `720p/webm`.
impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resolution.label(), self.format)
    }
}

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

/// Overall classification of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Every variant was produced.
    Complete,
    /// Some variants were produced, some failed.
    PartiallyComplete,
    /// Nothing was produced, or the encoder was unavailable.
    Failed,
}

impl JobStatus {
    /// Only jobs that produced at least one artifact are recorded.
    pub fn is_persistable(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Complete => write!(f, "complete"),
            Self::PartiallyComplete => write!(f, "partially_complete"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "complete" => Ok(Self::Complete),
            "partially_complete" => Ok(Self::PartiallyComplete),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown job status {other:?}"))),
        }
    }
}
