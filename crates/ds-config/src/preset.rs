//! Settings presets for common downscaling targets.
//!
//! Provides pre-built settings for:
//! - Precipitation: Bernoulli-Gamma loss, channel units
//! - Temperature: Gaussian loss, channel units
//! - Patch scan: Gaussian loss, 2x2 patches with local sampling
//! - Quick: few perturbations for smoke runs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::settings::{
    LossKind, LossSettings, RelevanceSettings, SamplingScopeKind, SamplingSettings, UnitMode,
    UnitSettings,
};

/// Available settings presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    Precipitation,
    Temperature,
    PatchScan,
    Quick,
}

impl PresetName {
    /// All available preset names.
    pub const ALL: &'static [PresetName] = &[
        PresetName::Precipitation,
        PresetName::Temperature,
        PresetName::PatchScan,
        PresetName::Quick,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::Precipitation => "precipitation",
            PresetName::Temperature => "temperature",
            PresetName::PatchScan => "patch-scan",
            PresetName::Quick => "quick",
        }
    }

    /// Parse preset name from string.
    pub fn parse(s: &str) -> Option<PresetName> {
        match s.to_lowercase().as_str() {
            "precipitation" | "precip" | "pr" => Some(PresetName::Precipitation),
            "temperature" | "temp" | "tas" => Some(PresetName::Temperature),
            "patch-scan" | "patch_scan" | "patch" => Some(PresetName::PatchScan),
            "quick" | "smoke" => Some(PresetName::Quick),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            PresetName::Precipitation => {
                "Bernoulli-Gamma loss, per-channel relevance of expected precipitation"
            }
            PresetName::Temperature => {
                "Gaussian loss, per-channel relevance of expected temperature"
            }
            PresetName::PatchScan => {
                "Gaussian loss, 2x2 patches resampled from a +/-1 cell local window"
            }
            PresetName::Quick => "Three perturbations per unit for fast smoke runs",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PresetName {
    type Err = PresetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PresetName::parse(s).ok_or_else(|| PresetError::UnknownPreset(s.to_string()))
    }
}

/// Errors related to preset operations.
#[derive(Debug, Clone)]
pub enum PresetError {
    UnknownPreset(String),
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::UnknownPreset(name) => write!(
                f,
                "Unknown preset '{}'. Available: {}",
                name,
                PresetName::ALL
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl std::error::Error for PresetError {}

/// Get the settings for a preset.
pub fn get_preset(name: PresetName) -> RelevanceSettings {
    let base = RelevanceSettings {
        description: Some(format!("preset:{}", name.as_str())),
        ..RelevanceSettings::default()
    };
    match name {
        PresetName::Precipitation => RelevanceSettings {
            loss: LossSettings {
                kind: LossKind::BernoulliGamma,
                ..LossSettings::default()
            },
            ..base
        },
        PresetName::Temperature => RelevanceSettings {
            loss: LossSettings {
                kind: LossKind::Gaussian,
                ..LossSettings::default()
            },
            ..base
        },
        PresetName::PatchScan => RelevanceSettings {
            unit: UnitSettings {
                mode: UnitMode::Patch,
                patch_size: 2,
            },
            sampling: SamplingSettings {
                scope: SamplingScopeKind::Local,
                window_size: 1,
            },
            ..base
        },
        PresetName::Quick => RelevanceSettings {
            num_samples: 3,
            batch_size: 8,
            ..base
        },
    }
}

/// Summary of a preset for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresetInfo {
    pub name: String,
    pub description: String,
    pub loss: LossKind,
    pub num_samples: usize,
}

impl PresetInfo {
    pub fn from_preset(name: PresetName) -> Self {
        let settings = get_preset(name);
        PresetInfo {
            name: name.as_str().to_string(),
            description: name.description().to_string(),
            loss: settings.loss.kind,
            num_samples: settings.num_samples,
        }
    }
}

/// List all presets with their descriptions.
pub fn list_presets() -> Vec<PresetInfo> {
    PresetName::ALL
        .iter()
        .map(|&name| PresetInfo::from_preset(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_settings;

    #[test]
    fn test_preset_name_parsing() {
        assert_eq!(PresetName::parse("precip"), Some(PresetName::Precipitation));
        assert_eq!(PresetName::parse("TAS"), Some(PresetName::Temperature));
        assert_eq!(PresetName::parse("patch_scan"), Some(PresetName::PatchScan));
        assert_eq!(PresetName::parse("smoke"), Some(PresetName::Quick));
        assert_eq!(PresetName::parse("unknown"), None);
    }

    #[test]
    fn test_unknown_preset_lists_options() {
        let err = "nope".parse::<PresetName>().unwrap_err();
        assert!(err.to_string().contains("patch-scan"));
    }

    #[test]
    fn test_all_presets_validate() {
        for &name in PresetName::ALL {
            validate_settings(&get_preset(name)).unwrap();
        }
    }

    #[test]
    fn test_preset_contents() {
        assert_eq!(get_preset(PresetName::Precipitation).loss.kind, LossKind::BernoulliGamma);
        assert_eq!(get_preset(PresetName::PatchScan).unit.mode, UnitMode::Patch);
        assert_eq!(get_preset(PresetName::Quick).num_samples, 3);
        assert_eq!(list_presets().len(), 4);
    }
}
