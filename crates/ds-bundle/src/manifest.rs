//! Bundle manifest types and serialization.
//!
//! The manifest is the source of truth for a bundle's contents:
//! run identity, the settings hash the map was computed under, and a file
//! listing with SHA-256 checksums.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current bundle schema version.
pub const BUNDLE_SCHEMA_VERSION: &str = "1.0.0";

/// Manifest file name within the bundle.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Bundle manifest containing metadata and file checksums.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    /// Bundle format version.
    pub bundle_version: String,

    /// Schema version of the relevance map document.
    pub schema_version: String,

    pub created_at: DateTime<Utc>,

    /// Host that computed the run.
    pub host_id: String,

    /// Run this bundle packages.
    pub run_id: String,

    /// SHA-256 of the effective settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,

    /// Files included in the bundle with checksums.
    pub files: Vec<FileEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Tool version that created this bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_version: Option<String>,
}

impl BundleManifest {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            bundle_version: BUNDLE_SCHEMA_VERSION.to_string(),
            schema_version: BUNDLE_SCHEMA_VERSION.to_string(),
            created_at: Utc::now(),
            host_id: host_id.into(),
            run_id: run_id.into(),
            config_hash: None,
            files: Vec::new(),
            description: None,
            tool_version: None,
        }
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = version.into();
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.tool_version = Some(version.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_file(&mut self, entry: FileEntry) {
        self.files.push(entry);
    }

    /// Total size of all files in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.bytes).sum()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn find_file(&self, path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Validate the manifest structure.
    pub fn validate(&self) -> crate::Result<()> {
        if self.bundle_version != BUNDLE_SCHEMA_VERSION {
            return Err(crate::BundleError::UnsupportedVersion {
                version: self.bundle_version.clone(),
                supported: BUNDLE_SCHEMA_VERSION.to_string(),
            });
        }

        if self.run_id.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "run_id is empty".to_string(),
            ));
        }

        if self.host_id.is_empty() {
            return Err(crate::BundleError::CorruptedManifest(
                "host_id is empty".to_string(),
            ));
        }

        for file in &self.files {
            if file.path.is_empty() || file.path == MANIFEST_FILE_NAME {
                return Err(crate::BundleError::CorruptedManifest(format!(
                    "invalid file entry path '{}'",
                    file.path
                )));
            }
            if file.sha256.len() != 64 || !file.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(crate::BundleError::CorruptedManifest(format!(
                    "file '{}' has invalid checksum",
                    file.path
                )));
            }
        }

        Ok(())
    }

    /// Sort files for deterministic ordering.
    pub fn sort_files(&mut self) {
        self.files.sort_by(|a, b| a.path.cmp(&b.path));
    }

    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// File entry in the manifest with checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path within the bundle (relative).
    pub path: String,

    /// SHA-256 checksum (64 hex characters).
    pub sha256: String,

    /// Size in bytes.
    pub bytes: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FileEntry {
    pub fn new(path: impl Into<String>, sha256: impl Into<String>, bytes: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            bytes,
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Compute SHA-256 checksum of data.
    pub fn compute_checksum(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hex::encode(hasher.finalize())
    }

    /// Verify the checksum against data.
    pub fn verify(&self, data: &[u8]) -> bool {
        Self::compute_checksum(data) == self.sha256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RUN: &str = "ds-20261018-143022-abcd";

    #[test]
    fn test_manifest_new() {
        let manifest = BundleManifest::new(RUN, "host-abc");
        assert_eq!(manifest.run_id, RUN);
        assert_eq!(manifest.host_id, "host-abc");
        assert_eq!(manifest.bundle_version, BUNDLE_SCHEMA_VERSION);
        assert!(manifest.config_hash.is_none());
    }

    #[test]
    fn test_manifest_builder() {
        let manifest = BundleManifest::new(RUN, "host-abc")
            .with_tool_version("0.1.0")
            .with_config_hash("f".repeat(64))
            .with_description("precipitation over test domain");

        assert_eq!(manifest.tool_version.as_deref(), Some("0.1.0"));
        assert_eq!(manifest.config_hash.as_deref().map(str::len), Some(64));
        assert!(manifest.description.is_some());
    }

    #[test]
    fn test_manifest_totals_and_lookup() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 100));
        manifest.add_file(FileEntry::new("relevance_map.json", "b".repeat(64), 200));

        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.total_bytes(), 300);
        assert!(manifest.find_file("summary.json").is_some());
        assert!(manifest.find_file("missing.json").is_none());
    }

    #[test]
    fn test_manifest_sort_files() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 1));
        manifest.add_file(FileEntry::new("config.json", "b".repeat(64), 1));
        manifest.add_file(FileEntry::new("logs/events.jsonl", "c".repeat(64), 1));
        manifest.sort_files();

        let paths: Vec<_> = manifest.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["config.json", "logs/events.jsonl", "summary.json"]);
    }

    #[test]
    fn test_manifest_validate() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.add_file(FileEntry::new("summary.json", "a".repeat(64), 100));
        assert!(manifest.validate().is_ok());

        assert!(BundleManifest::new("", "host-abc").validate().is_err());

        let mut bad = BundleManifest::new(RUN, "host-abc");
        bad.add_file(FileEntry::new("summary.json", "z".repeat(64), 1));
        assert!(bad.validate().is_err());

        let mut shadow = BundleManifest::new(RUN, "host-abc");
        shadow.add_file(FileEntry::new(MANIFEST_FILE_NAME, "a".repeat(64), 1));
        assert!(shadow.validate().is_err());
    }

    #[test]
    fn test_manifest_version_check() {
        let mut manifest = BundleManifest::new(RUN, "host-abc");
        manifest.bundle_version = "9.0.0".into();
        assert!(matches!(
            manifest.validate(),
            Err(crate::BundleError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_file_entry_verify() {
        let data = b"relevance";
        let entry = FileEntry::new("x", FileEntry::compute_checksum(data), data.len() as u64);
        assert!(entry.verify(data));
        assert!(!entry.verify(b"relevancE"));
    }
}
