//! Downscaling saliency common types, IDs, and errors.
//!
//! This crate provides foundational types shared across the workspace:
//! - Unified error type with stable codes and batch results
//! - Run identifiers
//! - Output formats for CLI payloads
//! - Schema versioning

pub mod error;
pub mod id;
pub mod output;
pub mod schema;

pub use error::{
    format_batch_human, format_error_human, BatchError, BatchResult, BatchSummary, Error,
    ErrorCategory, Result, StructuredError, SuggestedAction,
};
pub use id::RunId;
pub use output::OutputFormat;
pub use schema::SCHEMA_VERSION;
