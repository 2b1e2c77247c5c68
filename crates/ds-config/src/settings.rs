//! Relevance settings types.
//!
//! These types define the `relevance.json` file format. Every section has
//! defaults, so `{"schema_version": "1.0.0"}` is a complete file.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::validate::ValidationError;

/// Complete relevance settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RelevanceSettings {
    pub schema_version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub loss: LossSettings,

    #[serde(default)]
    pub unit: UnitSettings,

    #[serde(default)]
    pub sampling: SamplingSettings,

    /// Perturbed copies drawn per unit.
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,

    /// Perturbed copies passed to the model per call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Samples scored concurrently. `None` uses the worker count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_in_flight: Option<usize>,

    #[serde(default)]
    pub score: ScoreSettings,

    #[serde(default)]
    pub seed: u64,

    /// Worker threads. `None` uses the rayon default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
}

fn default_num_samples() -> usize {
    10
}

fn default_batch_size() -> usize {
    32
}

impl Default for RelevanceSettings {
    fn default() -> Self {
        RelevanceSettings {
            schema_version: crate::CONFIG_SCHEMA_VERSION.to_string(),
            description: None,
            loss: LossSettings::default(),
            unit: UnitSettings::default(),
            sampling: SamplingSettings::default(),
            num_samples: default_num_samples(),
            batch_size: default_batch_size(),
            max_in_flight: None,
            score: ScoreSettings::default(),
            seed: 0,
            threads: None,
        }
    }
}

impl RelevanceSettings {
    /// Load settings from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ValidationError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ValidationError::IoError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&content)
    }

    /// Parse settings from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, ValidationError> {
        serde_json::from_str(content).map_err(|e| ValidationError::ParseError(e.to_string()))
    }

    /// Canonical JSON used for hashing and bundling.
    pub fn to_canonical_json(&self) -> String {
        // Field order is fixed by the struct definition.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// JSON Schema for the settings file.
    pub fn json_schema() -> schemars::Schema {
        schemars::schema_for!(RelevanceSettings)
    }
}

/// Distributional loss selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LossKind {
    /// Zero-inflated occurrence/amount model for precipitation.
    BernoulliGamma,
    /// Mean and log-scale model for temperature.
    #[default]
    Gaussian,
}

impl LossKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LossKind::BernoulliGamma => "bernoulli_gamma",
            LossKind::Gaussian => "gaussian",
        }
    }

    pub fn parse(s: &str) -> Option<LossKind> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "bernoulli_gamma" | "bg" | "precipitation" => Some(LossKind::BernoulliGamma),
            "gaussian" | "normal" | "temperature" => Some(LossKind::Gaussian),
            _ => None,
        }
    }
}

impl fmt::Display for LossKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for LossKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LossKind::parse(s).ok_or_else(|| {
            format!("unknown loss '{s}'. Available: bernoulli_gamma, gaussian")
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LossSettings {
    #[serde(default)]
    pub kind: LossKind,

    /// Clamping floor for probabilities and positive parameters.
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,

    /// Amounts at or below this value count as dry days.
    #[serde(default)]
    pub wet_threshold: f64,
}

fn default_epsilon() -> f64 {
    1e-6
}

impl Default for LossSettings {
    fn default() -> Self {
        LossSettings {
            kind: LossKind::default(),
            epsilon: default_epsilon(),
            wet_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum UnitMode {
    /// One unit per channel.
    #[default]
    Channel,
    /// Non-overlapping square patches within each channel.
    Patch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct UnitSettings {
    #[serde(default)]
    pub mode: UnitMode,

    /// Patch side length in grid cells (patch mode only).
    #[serde(default = "default_patch_size")]
    pub patch_size: usize,
}

fn default_patch_size() -> usize {
    2
}

impl Default for UnitSettings {
    fn default() -> Self {
        UnitSettings {
            mode: UnitMode::default(),
            patch_size: default_patch_size(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SamplingScopeKind {
    /// Replacement values come from the same cells of a random baseline step.
    #[default]
    Global,
    /// Replacement values come from a randomly shifted window of a baseline step.
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SamplingSettings {
    #[serde(default)]
    pub scope: SamplingScopeKind,

    /// Maximum shift in grid cells (local scope only).
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    1
}

impl Default for SamplingSettings {
    fn default() -> Self {
        SamplingSettings {
            scope: SamplingScopeKind::default(),
            window_size: default_window_size(),
        }
    }
}

/// How per-copy prediction differences are reduced to a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreMode {
    /// Mean of `reference - perturbed`.
    #[default]
    Signed,
    /// Absolute value of the signed score.
    Absolute,
}

/// Which scalar is compared between reference and perturbed predictions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScoreTarget {
    /// Expected value of the predictive distribution.
    #[default]
    Expectation,
    /// Log-likelihood of observed targets.
    LogLikelihood,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct ScoreSettings {
    #[serde(default)]
    pub mode: ScoreMode,

    #[serde(default)]
    pub target: ScoreTarget,
}

/// Command-line overrides applied on top of loaded settings.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub loss: Option<LossKind>,
    pub num_samples: Option<usize>,
    pub seed: Option<u64>,
    /// Switches to patch mode with this side length.
    pub patch_size: Option<usize>,
    /// Switches to local sampling with this window.
    pub window_size: Option<usize>,
    pub absolute: bool,
    pub log_likelihood: bool,
    pub threads: Option<usize>,
}

impl SettingsOverrides {
    /// Apply overrides, returning the effective settings.
    pub fn apply(&self, mut settings: RelevanceSettings) -> RelevanceSettings {
        if let Some(kind) = self.loss {
            settings.loss.kind = kind;
        }
        if let Some(n) = self.num_samples {
            settings.num_samples = n;
        }
        if let Some(seed) = self.seed {
            settings.seed = seed;
        }
        if let Some(l) = self.patch_size {
            settings.unit = UnitSettings {
                mode: UnitMode::Patch,
                patch_size: l,
            };
        }
        if let Some(k) = self.window_size {
            settings.sampling = SamplingSettings {
                scope: SamplingScopeKind::Local,
                window_size: k,
            };
        }
        if self.absolute {
            settings.score.mode = ScoreMode::Absolute;
        }
        if self.log_likelihood {
            settings.score.target = ScoreTarget::LogLikelihood;
        }
        if let Some(t) = self.threads {
            settings.threads = Some(t);
        }
        settings
    }

    pub fn is_empty(&self) -> bool {
        self.loss.is_none()
            && self.num_samples.is_none()
            && self.seed.is_none()
            && self.patch_size.is_none()
            && self.window_size.is_none()
            && !self.absolute
            && !self.log_likelihood
            && self.threads.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_file_uses_defaults() {
        let settings = RelevanceSettings::from_json_str(r#"{"schema_version":"1.0.0"}"#).unwrap();
        assert_eq!(settings, RelevanceSettings::default());
        assert_eq!(settings.num_samples, 10);
        assert_eq!(settings.batch_size, 32);
        assert_eq!(settings.loss.kind, LossKind::Gaussian);
        assert_eq!(settings.loss.epsilon, 1e-6);
    }

    #[test]
    fn snake_case_enums() {
        let settings = RelevanceSettings::from_json_str(
            r#"{
                "schema_version": "1.0.0",
                "loss": {"kind": "bernoulli_gamma", "wet_threshold": 0.1},
                "unit": {"mode": "patch", "patch_size": 4},
                "sampling": {"scope": "local", "window_size": 2},
                "score": {"mode": "absolute", "target": "log_likelihood"}
            }"#,
        )
        .unwrap();
        assert_eq!(settings.loss.kind, LossKind::BernoulliGamma);
        assert_eq!(settings.loss.wet_threshold, 0.1);
        assert_eq!(settings.unit.mode, UnitMode::Patch);
        assert_eq!(settings.unit.patch_size, 4);
        assert_eq!(settings.sampling.scope, SamplingScopeKind::Local);
        assert_eq!(settings.score.mode, ScoreMode::Absolute);
        assert_eq!(settings.score.target, ScoreTarget::LogLikelihood);
    }

    #[test]
    fn unknown_loss_is_a_parse_error() {
        let err = RelevanceSettings::from_json_str(
            r#"{"schema_version":"1.0.0","loss":{"kind":"poisson"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::ParseError(_)));
    }

    #[test]
    fn loss_kind_aliases() {
        assert_eq!(LossKind::parse("BG"), Some(LossKind::BernoulliGamma));
        assert_eq!(LossKind::parse("bernoulli-gamma"), Some(LossKind::BernoulliGamma));
        assert_eq!(LossKind::parse("normal"), Some(LossKind::Gaussian));
        assert!("poisson".parse::<LossKind>().is_err());
    }

    #[test]
    fn overrides_switch_modes() {
        let overrides = SettingsOverrides {
            patch_size: Some(3),
            window_size: Some(2),
            absolute: true,
            seed: Some(9),
            ..Default::default()
        };
        let out = overrides.apply(RelevanceSettings::default());
        assert_eq!(out.unit.mode, UnitMode::Patch);
        assert_eq!(out.unit.patch_size, 3);
        assert_eq!(out.sampling.scope, SamplingScopeKind::Local);
        assert_eq!(out.sampling.window_size, 2);
        assert_eq!(out.score.mode, ScoreMode::Absolute);
        assert_eq!(out.seed, 9);
        assert!(!overrides.is_empty());
        assert!(SettingsOverrides::default().is_empty());
    }

    #[test]
    fn schema_names_top_level_fields() {
        let schema = serde_json::to_value(RelevanceSettings::json_schema()).unwrap();
        let props = &schema["properties"];
        assert!(props.get("num_samples").is_some());
        assert!(props.get("loss").is_some());
    }
}
