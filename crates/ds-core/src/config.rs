//! Settings loading for ds-core.
//!
//! Resolution order: `--config` → `DS_RELEVANCE_CONFIG` →
//! `DS_CONFIG_DIR/relevance.json` → XDG → built-in defaults. A preset, when
//! given, replaces the file as the base. CLI overrides are applied last and
//! the result is validated.

pub use ds_config::{
    get_preset, list_presets, ConfigSnapshot, PresetInfo, PresetName, RelevanceSettings,
    SettingsOverrides, ValidationError,
};

use ds_config::{resolve_settings_path, validate_settings, ConfigSource, SettingsPath};
use std::path::PathBuf;
use thiserror::Error;

use crate::exit_codes::ExitCode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Settings file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Invalid JSON in settings file {path}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings validation failed: {0}")]
    ValidationError(#[from] ValidationError),

    #[error("I/O error reading {path}: {source}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ConfigError {
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ConfigError::NotFound { .. } => ExitCode::ArgsError,
            ConfigError::ParseError { .. } | ConfigError::ValidationError(_) => {
                ExitCode::ConfigError
            }
            ConfigError::IoError { .. } => ExitCode::IoError,
            ConfigError::VersionMismatch { .. } => ExitCode::VersionError,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct ConfigOptions {
    /// Explicit settings file.
    pub settings_path: Option<PathBuf>,
    pub preset: Option<PresetName>,
    pub overrides: SettingsOverrides,
}

/// Effective settings with provenance.
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: RelevanceSettings,
    pub path: SettingsPath,
    /// SHA-256 of the file content, when a file was read.
    pub content_hash: Option<String>,
    pub snapshot: ConfigSnapshot,
}

impl LoadedSettings {
    pub fn used_defaults(&self) -> bool {
        self.path.source == ConfigSource::BuiltinDefault
    }
}

pub fn load_settings(options: &ConfigOptions) -> Result<LoadedSettings, ConfigError> {
    let path = resolve_settings_path(options.settings_path.as_deref());

    let (base, content) = match (&options.preset, &path.path) {
        (Some(preset), _) => (get_preset(*preset), None),
        (None, Some(file)) => {
            let (settings, content) = load_settings_file(file)?;
            (settings, Some(content))
        }
        (None, None) => (RelevanceSettings::default(), None),
    };

    let settings = options.overrides.apply(base);
    validate_settings(&settings).map_err(|e| match e {
        ValidationError::VersionMismatch { expected, actual } => {
            ConfigError::VersionMismatch { expected, actual }
        }
        other => ConfigError::ValidationError(other),
    })?;

    let snapshot = ConfigSnapshot::new(&settings, &path, content.as_deref());
    Ok(LoadedSettings {
        content_hash: snapshot.file_hash.clone(),
        settings,
        path,
        snapshot,
    })
}

fn load_settings_file(path: &PathBuf) -> Result<(RelevanceSettings, String), ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound { path: path.clone() });
    }
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.clone(),
        source: e,
    })?;
    let settings: RelevanceSettings =
        serde_json::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;
    if settings.schema_version != ds_config::CONFIG_SCHEMA_VERSION {
        return Err(ConfigError::VersionMismatch {
            expected: ds_config::CONFIG_SCHEMA_VERSION.to_string(),
            actual: settings.schema_version,
        });
    }
    Ok((settings, content))
}
