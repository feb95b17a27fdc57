//! rf-db: database access and persistence layer.
//!
//! This crate provides the SQLite-backed job registry: connection pooling,
//! embedded migrations, the [`models::JobRecord`] model, raw query functions
//! and the [`registry::JobRegistry`] facade used by the pipeline.

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
pub mod registry;

pub use models::JobRecord;
pub use registry::JobRegistry;
