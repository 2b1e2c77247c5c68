//! Relevance bundle writer/reader.
//!
//! A `.dsb` bundle packages one relevance run so a map can be shared,
//! archived, and re-rendered without re-running the model.
//!
//! # Bundle Format
//!
//! Bundles are ZIP archives containing:
//! - `manifest.json`: Metadata, schema versions, file listing with checksums
//! - `relevance_map.json`: The relevance map document
//! - `summary.json`: Per-run summary (samples scored, failed, skipped)
//! - `config.json`: Effective settings (optional)
//! - `logs/`: JSONL progress events (optional)
//!
//! # Example
//!
//! ```no_run
//! use ds_bundle::{BundleReader, BundleWriter};
//! use std::path::Path;
//!
//! let mut writer = BundleWriter::new("ds-20261018-143022-abcd", "host-abc");
//! writer.add_summary(&serde_json::json!({"scored": 12})).unwrap();
//! writer.write(Path::new("run.dsb")).unwrap();
//!
//! let mut reader = BundleReader::open(Path::new("run.dsb")).unwrap();
//! let summary: serde_json::Value = reader.read_summary().unwrap();
//! ```

pub mod error;
pub mod manifest;
pub mod reader;
pub mod writer;

pub use error::{BundleError, Result};
pub use manifest::{BundleManifest, FileEntry, BUNDLE_SCHEMA_VERSION};
pub use reader::BundleReader;
pub use writer::{BundleWriter, FileType};
