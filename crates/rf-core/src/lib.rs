//! rf-core: shared types, IDs, errors, and configuration.
//!
//! This crate is the foundational dependency for all other rf-* crates,
//! providing the job identifier, a unified error type, the media-domain
//! types that describe the transcode matrix, and application configuration.

pub mod config;
pub mod error;
pub mod ids;
pub mod media;

// Re-export the most commonly used items at the crate root.
pub use error::{Error, Result};
pub use ids::JobId;
pub use media::*;
