//! Relevance settings loading and validation.
//!
//! This crate provides:
//! - Typed Rust structs for relevance.json
//! - Settings resolution (CLI → env → XDG → defaults)
//! - Named presets for common downscaling targets
//! - Semantic validation with field paths
//! - Settings snapshots for run provenance

pub mod preset;
pub mod resolve;
pub mod settings;
pub mod snapshot;
pub mod validate;

pub use preset::{get_preset, list_presets, PresetInfo, PresetName};
pub use resolve::{resolve_settings_path, ConfigSource, SettingsPath};
pub use settings::{
    LossKind, LossSettings, RelevanceSettings, SamplingScopeKind, SamplingSettings, ScoreMode,
    ScoreSettings, ScoreTarget, SettingsOverrides, UnitMode, UnitSettings,
};
pub use snapshot::ConfigSnapshot;
pub use validate::{validate_settings, ValidationError, ValidationResult};

/// Schema version for relevance settings files.
pub const CONFIG_SCHEMA_VERSION: &str = "1.0.0";
