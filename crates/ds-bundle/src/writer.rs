//! Bundle writer for creating .dsb files.
//!
//! Creates ZIP archives with manifest and checksums.

use crate::manifest::MANIFEST_FILE_NAME;
use crate::{BundleError, BundleManifest, FileEntry, Result};
use std::fs::File;
use std::io::{Cursor, Seek, Write};
use std::path::Path;
use tracing::{debug, info};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// Well-known entry names.
pub const RELEVANCE_MAP_FILE: &str = "relevance_map.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const CONFIG_FILE: &str = "config.json";

/// File type hints for MIME type assignment.
#[derive(Debug, Clone, Copy)]
pub enum FileType {
    Json,
    Log,
    Binary,
}

impl FileType {
    fn mime_type(&self) -> &'static str {
        match self {
            FileType::Json => "application/json",
            FileType::Log => "application/x-ndjson",
            FileType::Binary => "application/octet-stream",
        }
    }

    fn from_path(path: &str) -> Self {
        if path.ends_with(".jsonl") {
            FileType::Log
        } else if path.ends_with(".json") {
            FileType::Json
        } else {
            FileType::Binary
        }
    }
}

/// Builder for relevance bundles.
pub struct BundleWriter {
    manifest: BundleManifest,
    files: Vec<(String, Vec<u8>)>,
}

impl BundleWriter {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        Self {
            manifest: BundleManifest::new(run_id, host_id),
            files: Vec::new(),
        }
    }

    pub fn with_tool_version(mut self, version: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_tool_version(version);
        self
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_config_hash(hash);
        self
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_schema_version(version);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.manifest = self.manifest.with_description(description);
        self
    }

    /// Add a file to the bundle with automatic checksum.
    ///
    /// Adding a path twice replaces the earlier content.
    pub fn add_file(
        &mut self,
        path: impl Into<String>,
        data: Vec<u8>,
        file_type: Option<FileType>,
    ) {
        let path = path.into();
        let file_type = file_type.unwrap_or_else(|| FileType::from_path(&path));
        let bytes = data.len() as u64;
        let entry = FileEntry::new(&path, FileEntry::compute_checksum(&data), bytes)
            .with_mime_type(file_type.mime_type());

        self.manifest.files.retain(|f| f.path != path);
        self.files.retain(|(p, _)| *p != path);

        debug!(path = %path, bytes, "Added file to bundle");
        self.manifest.add_file(entry);
        self.files.push((path, data));
    }

    /// Add a JSON-serializable value as a file.
    pub fn add_json<T: serde::Serialize>(
        &mut self,
        path: impl Into<String>,
        value: &T,
    ) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        self.add_file(path, json.into_bytes(), Some(FileType::Json));
        Ok(())
    }

    /// Add the relevance map document.
    pub fn add_relevance_map<T: serde::Serialize>(&mut self, map: &T) -> Result<()> {
        self.add_json(RELEVANCE_MAP_FILE, map)
    }

    /// Add the run summary.
    pub fn add_summary<T: serde::Serialize>(&mut self, summary: &T) -> Result<()> {
        self.add_json(SUMMARY_FILE, summary)
    }

    /// Add the effective settings.
    pub fn add_config<T: serde::Serialize>(&mut self, config: &T) -> Result<()> {
        self.add_json(CONFIG_FILE, config)
    }

    /// Add a JSONL log file under `logs/`.
    pub fn add_log(&mut self, name: &str, data: Vec<u8>) {
        self.add_file(format!("logs/{}.jsonl", name), data, Some(FileType::Log));
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    /// Total size in bytes before compression.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|(_, data)| data.len() as u64).sum()
    }

    /// File count, not including the manifest.
    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    /// Write the bundle to a file.
    pub fn write(self, path: &Path) -> Result<BundleManifest> {
        let file = File::create(path)?;
        let (_, manifest) = self.write_archive(file)?;
        info!(
            path = %path.display(),
            files = manifest.file_count(),
            bytes = manifest.total_bytes(),
            run_id = %manifest.run_id,
            "Bundle written"
        );
        Ok(manifest)
    }

    /// Write the bundle to a byte vector.
    pub fn write_to_vec(self) -> Result<(Vec<u8>, BundleManifest)> {
        let (buffer, manifest) = self.write_archive(Cursor::new(Vec::new()))?;
        let bytes = buffer.into_inner();
        info!(
            files = manifest.file_count(),
            compressed_bytes = bytes.len(),
            uncompressed_bytes = manifest.total_bytes(),
            "Bundle written to memory"
        );
        Ok((bytes, manifest))
    }

    fn write_archive<W: Write + Seek>(mut self, sink: W) -> Result<(W, BundleManifest)> {
        if self.files.is_empty() {
            return Err(BundleError::EmptyBundle);
        }

        self.manifest.sort_files();
        self.files.sort_by(|a, b| a.0.cmp(&b.0));
        let manifest_json = self.manifest.to_json()?;

        let mut zip = ZipWriter::new(sink);
        let options: FileOptions<'_, ()> = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Manifest goes first so readers can stream it.
        zip.start_file(MANIFEST_FILE_NAME, options)?;
        zip.write_all(manifest_json.as_bytes())?;

        for (file_path, data) in &self.files {
            zip.start_file(file_path.as_str(), options)?;
            zip.write_all(data)?;
        }

        let sink = zip.finish()?;
        Ok((sink, self.manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const RUN: &str = "ds-20261018-143022-abcd";

    #[test]
    fn test_writer_new() {
        let writer = BundleWriter::new(RUN, "host-abc");
        assert_eq!(writer.manifest().run_id, RUN);
        assert_eq!(writer.file_count(), 0);
    }

    #[test]
    fn test_add_file_assigns_mime_and_checksum() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_file("logs/events.jsonl", b"{}\n".to_vec(), None);

        let entry = writer.manifest().find_file("logs/events.jsonl").unwrap();
        assert_eq!(entry.mime_type.as_deref(), Some("application/x-ndjson"));
        assert_eq!(entry.sha256.len(), 64);
        assert_eq!(entry.bytes, 3);
    }

    #[test]
    fn test_add_file_twice_replaces() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_file("summary.json", b"{}".to_vec(), None);
        writer.add_file("summary.json", b"{\"a\":1}".to_vec(), None);
        assert_eq!(writer.file_count(), 1);
        assert_eq!(writer.manifest().file_count(), 1);
        assert_eq!(writer.total_bytes(), 7);
    }

    #[test]
    fn test_empty_bundle_rejected() {
        let writer = BundleWriter::new(RUN, "host-abc");
        assert!(matches!(writer.write_to_vec(), Err(BundleError::EmptyBundle)));
    }

    #[test]
    fn test_write_to_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.dsb");

        let mut writer = BundleWriter::new(RUN, "host-abc").with_tool_version("0.1.0");
        writer.add_summary(&serde_json::json!({"scored": 2})).unwrap();
        writer.add_relevance_map(&serde_json::json!({"shape": [1, 1, 1, 1, 1]})).unwrap();
        let manifest = writer.write(&path).unwrap();

        assert!(path.exists());
        assert_eq!(manifest.file_count(), 2);
        assert_eq!(manifest.files[0].path, RELEVANCE_MAP_FILE);
    }

    #[test]
    fn test_write_is_deterministic_in_order() {
        let mut writer = BundleWriter::new(RUN, "host-abc");
        writer.add_file("b.json", b"1".to_vec(), None);
        writer.add_file("a.json", b"2".to_vec(), None);
        let (_, manifest) = writer.write_to_vec().unwrap();
        assert_eq!(manifest.files[0].path, "a.json");
        assert_eq!(manifest.files[1].path, "b.json");
    }
}
