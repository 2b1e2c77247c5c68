//! Settings snapshots for run provenance.
//!
//! A snapshot records the effective settings of a run together with where
//! they came from, so a relevance map can be reproduced later.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::resolve::SettingsPath;
use crate::settings::{
    LossKind, RelevanceSettings, SamplingScopeKind, ScoreMode, ScoreTarget, UnitMode,
};

/// A frozen snapshot of settings state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,

    /// Schema version of the settings.
    pub schema_version: String,

    /// SHA-256 of the settings file content, if one was loaded.
    #[serde(default)]
    pub file_hash: Option<String>,

    /// Path the settings were loaded from.
    #[serde(default)]
    pub file_path: Option<String>,

    /// Source of the settings file.
    pub source: String,

    /// SHA-256 of the effective settings after overrides.
    pub settings_hash: String,

    /// Key values for quick reference.
    pub summary: SettingsSummary,
}

/// Summary of key settings values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsSummary {
    pub loss: LossKind,
    pub unit: UnitMode,
    pub patch_size: Option<usize>,
    pub sampling: SamplingScopeKind,
    pub window_size: Option<usize>,
    pub num_samples: usize,
    pub score_mode: ScoreMode,
    pub score_target: ScoreTarget,
    pub seed: u64,
}

impl SettingsSummary {
    fn from_settings(settings: &RelevanceSettings) -> Self {
        SettingsSummary {
            loss: settings.loss.kind,
            unit: settings.unit.mode,
            patch_size: (settings.unit.mode == UnitMode::Patch).then_some(settings.unit.patch_size),
            sampling: settings.sampling.scope,
            window_size: (settings.sampling.scope == SamplingScopeKind::Local)
                .then_some(settings.sampling.window_size),
            num_samples: settings.num_samples,
            score_mode: settings.score.mode,
            score_target: settings.score.target,
            seed: settings.seed,
        }
    }
}

impl ConfigSnapshot {
    /// Create a snapshot of effective settings.
    ///
    /// `file_content` is the raw text of the loaded file, if any.
    pub fn new(
        settings: &RelevanceSettings,
        path: &SettingsPath,
        file_content: Option<&str>,
    ) -> Self {
        ConfigSnapshot {
            timestamp: Utc::now(),
            schema_version: settings.schema_version.clone(),
            file_hash: file_content.map(hash_content),
            file_path: path.path.as_ref().map(|p| p.display().to_string()),
            source: path.source.to_string(),
            settings_hash: hash_content(&settings.to_canonical_json()),
            summary: SettingsSummary::from_settings(settings),
        }
    }

    /// Create a snapshot of built-in defaults.
    pub fn defaults_only() -> Self {
        Self::new(&RelevanceSettings::default(), &SettingsPath::default(), None)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check if this snapshot has the same effective settings as another.
    pub fn matches(&self, other: &ConfigSnapshot) -> bool {
        self.settings_hash == other.settings_hash
    }

    /// Short identifier (first 12 chars of the settings hash).
    pub fn short_id(&self) -> &str {
        &self.settings_hash[..12.min(self.settings_hash.len())]
    }
}

/// Hash content with SHA-256 and return hex string.
pub fn hash_content(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_snapshot() {
        let snapshot = ConfigSnapshot::defaults_only();
        assert_eq!(snapshot.schema_version, crate::CONFIG_SCHEMA_VERSION);
        assert!(snapshot.file_hash.is_none());
        assert_eq!(snapshot.source, "builtin default");
        assert_eq!(snapshot.summary.num_samples, 10);
        assert_eq!(snapshot.summary.patch_size, None);
    }

    #[test]
    fn test_snapshot_short_id() {
        assert_eq!(ConfigSnapshot::defaults_only().short_id().len(), 12);
    }

    #[test]
    fn test_snapshot_tracks_effective_settings() {
        let a = ConfigSnapshot::defaults_only();
        let b = ConfigSnapshot::defaults_only();
        assert!(a.matches(&b));

        let changed = RelevanceSettings {
            seed: 42,
            ..Default::default()
        };
        let c = ConfigSnapshot::new(&changed, &SettingsPath::default(), None);
        assert!(!a.matches(&c));
        assert_eq!(c.summary.seed, 42);
    }

    #[test]
    fn test_hash_content() {
        let hash = hash_content("test");
        assert_eq!(hash, hash_content("test"));
        assert_eq!(hash.len(), 64);
    }

    #[test]
    fn test_snapshot_json_roundtrip() {
        let snapshot = ConfigSnapshot::defaults_only();
        let restored = ConfigSnapshot::from_json(&snapshot.to_json().unwrap()).unwrap();
        assert!(snapshot.matches(&restored));
        assert_eq!(snapshot.summary, restored.summary);
    }
}
