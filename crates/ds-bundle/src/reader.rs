//! Bundle reader for opening and verifying .dsb files.
//!
//! Reads ZIP archives with integrity verification.

use crate::manifest::MANIFEST_FILE_NAME;
use crate::writer::{CONFIG_FILE, RELEVANCE_MAP_FILE, SUMMARY_FILE};
use crate::{BundleError, BundleManifest, FileEntry, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek};
use std::path::Path;
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Reader for relevance bundles with verification.
pub struct BundleReader<R: Read + Seek> {
    manifest: BundleManifest,
    archive: ZipArchive<R>,
    verified: HashSet<String>,
}

impl BundleReader<File> {
    /// Open a bundle from a file path.
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_reader(File::open(path)?)
    }
}

impl BundleReader<Cursor<Vec<u8>>> {
    /// Open a bundle from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        Self::from_reader(Cursor::new(bytes))
    }
}

impl<R: Read + Seek> BundleReader<R> {
    /// Create a reader from any Read + Seek source.
    ///
    /// Fails if the manifest is missing, unparsable, or structurally invalid.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let manifest = Self::read_manifest(&mut archive)?;
        manifest.validate()?;

        info!(
            run_id = %manifest.run_id,
            files = manifest.file_count(),
            "Bundle opened"
        );

        Ok(Self {
            manifest,
            archive,
            verified: HashSet::new(),
        })
    }

    fn read_manifest(archive: &mut ZipArchive<R>) -> Result<BundleManifest> {
        let mut manifest_file = archive
            .by_name(MANIFEST_FILE_NAME)
            .map_err(|_| BundleError::MissingFile(MANIFEST_FILE_NAME.to_string()))?;

        let mut json = String::new();
        manifest_file.read_to_string(&mut json)?;
        BundleManifest::from_json(&json)
            .map_err(|e| BundleError::CorruptedManifest(e.to_string()))
    }

    pub fn manifest(&self) -> &BundleManifest {
        &self.manifest
    }

    pub fn run_id(&self) -> &str {
        &self.manifest.run_id
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.manifest.files
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.manifest.find_file(path).is_some()
    }

    /// Read a file from the bundle without verification.
    ///
    /// Use `read_verified` for integrity-checked reads.
    pub fn read_raw(&mut self, path: &str) -> Result<Vec<u8>> {
        let mut file = self
            .archive
            .by_name(path)
            .map_err(|_| BundleError::FileNotFound(path.to_string()))?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        debug!(path, bytes = data.len(), "Read file from bundle (unverified)");
        Ok(data)
    }

    /// Read a file with checksum verification.
    ///
    /// Only files listed in the manifest can be read this way.
    pub fn read_verified(&mut self, path: &str) -> Result<Vec<u8>> {
        let expected = self
            .manifest
            .find_file(path)
            .ok_or_else(|| BundleError::FileNotFound(path.to_string()))?
            .sha256
            .clone();

        let data = self.read_raw(path)?;
        let actual = FileEntry::compute_checksum(&data);
        if actual != expected {
            return Err(BundleError::ChecksumMismatch {
                path: path.to_string(),
                expected,
                actual,
            });
        }

        self.verified.insert(path.to_string());
        debug!(path, "File verified");
        Ok(data)
    }

    pub fn is_verified(&self, path: &str) -> bool {
        self.verified.contains(path)
    }

    /// Verify all files in the bundle.
    ///
    /// Returns the paths that failed verification.
    pub fn verify_all(&mut self) -> Vec<String> {
        let paths: Vec<String> = self.manifest.files.iter().map(|f| f.path.clone()).collect();
        let mut failures = Vec::new();

        for path in paths {
            if let Err(e) = self.read_verified(&path) {
                warn!(path = %path, error = %e, "Verification failed");
                failures.push(path);
            }
        }

        if failures.is_empty() {
            info!("All files verified");
        } else {
            warn!(failures = ?failures, "Some files failed verification");
        }

        failures
    }

    /// Read and parse a verified JSON file.
    pub fn read_json<T: serde::de::DeserializeOwned>(&mut self, path: &str) -> Result<T> {
        let data = self.read_verified(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn read_summary<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        self.read_json(SUMMARY_FILE)
    }

    pub fn read_relevance_map<T: serde::de::DeserializeOwned>(&mut self) -> Result<T> {
        self.read_json(RELEVANCE_MAP_FILE)
    }

    /// Read the effective settings, if bundled.
    pub fn read_config<T: serde::de::DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if self.has_file(CONFIG_FILE) {
            Ok(Some(self.read_json(CONFIG_FILE)?))
        } else {
            Ok(None)
        }
    }

    /// List log files in the bundle.
    pub fn log_files(&self) -> Vec<&FileEntry> {
        self.manifest
            .files
            .iter()
            .filter(|f| f.path.starts_with("logs/") && f.path.ends_with(".jsonl"))
            .collect()
    }

    pub fn read_log(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_verified(&format!("logs/{}.jsonl", name))
    }
}
