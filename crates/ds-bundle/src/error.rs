//! Error types for bundle operations.

use thiserror::Error;

/// Errors that can occur during bundle operations.
#[derive(Error, Debug)]
pub enum BundleError {
    /// Reading or writing the bundle file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Manifest, summary or map JSON could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A bundled file does not hash to its manifest checksum
    #[error("checksum mismatch for '{path}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    /// Manifest is absent from the archive
    #[error("missing required file: {0}")]
    MissingFile(String),

    /// Bundle written by an incompatible schema major version
    #[error("unsupported bundle version: {version} (supported: {supported})")]
    UnsupportedVersion { version: String, supported: String },

    /// Manifest is unreadable or its entries are inconsistent
    #[error("corrupted manifest: {0}")]
    CorruptedManifest(String),

    /// Requested file (map, summary, config) is not listed
    #[error("file not found in bundle: {0}")]
    FileNotFound(String),

    /// Writer was asked to write with no files added
    #[error("bundle has no content to write")]
    EmptyBundle,
}

/// Result type alias for bundle operations.
pub type Result<T> = std::result::Result<T, BundleError>;
