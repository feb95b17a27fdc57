//! Artifact storage boundary.
//!
//! An [`ArtifactSink`] turns a logical output name into a writable location
//! and later into a retrievable reference. The encoder only ever hands the
//! external tool locations that came out of a sink.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use rf_core::{Error, JobId, Result};

/// Where encoded files land and how callers retrieve them.
pub trait ArtifactSink: Send + Sync {
    /// Prepare a writable location for `logical_name`.
    ///
    /// Returns [`Error::SinkWrite`] when the location cannot be written.
    fn allocate(&self, job_id: &JobId, logical_name: &str) -> Result<PathBuf>;

    /// Derive the URL or path a client uses to fetch `location`.
    fn public_reference(&self, location: &Path) -> Result<String>;
}

/// Flat directory of artifacts served under a common URL prefix.
#[derive(Debug, Clone)]
pub struct LocalSink {
    root: PathBuf,
    base_url: String,
}

impl LocalSink {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    pub fn from_config(storage: &rf_core::config::StorageConfig) -> Self {
        Self::new(&storage.output_dir, &storage.public_base_url)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

impl ArtifactSink for LocalSink {
    fn allocate(&self, job_id: &JobId, logical_name: &str) -> Result<PathBuf> {
        let location = self.root.join(logical_name);
        if !is_plain_file_name(logical_name) {
            return Err(Error::sink_write(
                location,
                "artifact name must be a plain file name",
            ));
        }

        fs::create_dir_all(&self.root).map_err(|e| {
            Error::sink_write(&self.root, format!("cannot create output directory: {e}"))
        })?;

        // Opening the file up front surfaces permission problems before the
        // encoder is started; the encoder overwrites it.
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&location)
            .map_err(|e| Error::sink_write(&location, e.to_string()))?;

        tracing::debug!(job_id = %job_id, "Allocated artifact {}", location.display());
        Ok(location)
    }

    fn public_reference(&self, location: &Path) -> Result<String> {
        let name = location
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                Error::Internal(format!(
                    "artifact location has no file name: {}",
                    location.display()
                ))
            })?;

        let base = self.base_url.trim_end_matches('/');
        if base.is_empty() {
            Ok(name.to_string())
        } else {
            Ok(format!("{base}/{name}"))
        }
    }
}
