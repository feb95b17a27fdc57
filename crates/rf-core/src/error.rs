//! Unified error type for reelforge.
//!
//! All crates funnel their failures into [`Error`]. The variants mirror the
//! job-level taxonomy: environment faults that abort a job, per-variant
//! faults that are recovered locally, and registry outcomes.

use std::fmt;
use std::path::PathBuf;

/// Unified error type covering all failure modes in reelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A job with this identifier has already been recorded.
    #[error("Duplicate job: {0}")]
    DuplicateJob(String),

    /// Request data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An external tool could not be located or started.
    ///
    /// This is an environment fault and aborts the whole job.
    #[error("Tool unavailable [{tool}]: {message}")]
    ToolUnavailable {
        /// Name of the missing tool.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// An external tool ran but returned an error (non-zero exit, timeout).
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description, usually captured stderr.
        message: String,
    },

    /// An artifact location could not be prepared for writing.
    #[error("Sink write error at {}: {message}", location.display())]
    SinkWrite {
        /// The location that could not be written.
        location: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::ToolUnavailable`].
    pub fn tool_unavailable(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ToolUnavailable {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::SinkWrite`].
    pub fn sink_write(location: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::SinkWrite {
            location: location.into(),
            message: message.into(),
        }
    }

    /// Whether this error is an environment fault that must abort the job
    /// rather than being recorded against a single variant.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::ToolUnavailable { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
