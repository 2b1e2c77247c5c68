//! Settings validation errors and semantic validation.

use thiserror::Error;

use crate::settings::{RelevanceSettings, SamplingScopeKind, UnitMode};

/// Validation result type.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Settings validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("I/O error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Semantic validation failed: {0}")]
    SemanticError(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },
}

impl ValidationError {
    /// Error code for structured error reporting.
    pub fn code(&self) -> u32 {
        match self {
            ValidationError::IoError(_) => 60,
            ValidationError::ParseError(_) => 61,
            ValidationError::SemanticError(_) => 63,
            ValidationError::InvalidValue { .. } => 65,
            ValidationError::VersionMismatch { .. } => 66,
        }
    }

    /// Field path for value errors.
    pub fn field(&self) -> Option<&str> {
        match self {
            ValidationError::InvalidValue { field, .. } => Some(field),
            _ => None,
        }
    }
}

fn invalid(field: &str, message: String) -> ValidationError {
    ValidationError::InvalidValue {
        field: field.to_string(),
        message,
    }
}

/// Validate relevance settings semantically.
///
/// The sample count is not checked here: a count below one is a domain
/// error raised by the engine.
pub fn validate_settings(settings: &RelevanceSettings) -> ValidationResult<()> {
    if settings.schema_version != crate::CONFIG_SCHEMA_VERSION {
        return Err(ValidationError::VersionMismatch {
            expected: crate::CONFIG_SCHEMA_VERSION.to_string(),
            actual: settings.schema_version.clone(),
        });
    }

    let eps = settings.loss.epsilon;
    if !(eps > 0.0 && eps < 0.5) {
        return Err(invalid("loss.epsilon", format!("Must be in (0, 0.5), got {}", eps)));
    }

    let wet = settings.loss.wet_threshold;
    if !wet.is_finite() || wet < 0.0 {
        return Err(invalid(
            "loss.wet_threshold",
            format!("Must be finite and non-negative, got {}", wet),
        ));
    }

    if settings.unit.mode == UnitMode::Patch && settings.unit.patch_size == 0 {
        return Err(invalid("unit.patch_size", "Must be at least 1, got 0".to_string()));
    }

    if settings.sampling.scope == SamplingScopeKind::Local && settings.sampling.window_size == 0 {
        return Err(invalid(
            "sampling.window_size",
            "Must be at least 1 for local sampling, got 0".to_string(),
        ));
    }

    if settings.batch_size == 0 {
        return Err(invalid("batch_size", "Must be at least 1, got 0".to_string()));
    }

    if settings.max_in_flight == Some(0) {
        return Err(invalid("max_in_flight", "Must be at least 1, got 0".to_string()));
    }

    if settings.threads == Some(0) {
        return Err(invalid("threads", "Must be at least 1, got 0".to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::RelevanceSettings;

    #[test]
    fn defaults_are_valid() {
        validate_settings(&RelevanceSettings::default()).unwrap();
    }

    #[test]
    fn rejects_bad_epsilon() {
        let mut s = RelevanceSettings::default();
        s.loss.epsilon = 0.0;
        let err = validate_settings(&s).unwrap_err();
        assert_eq!(err.field(), Some("loss.epsilon"));

        s.loss.epsilon = f64::NAN;
        assert!(validate_settings(&s).is_err());
    }

    #[test]
    fn patch_size_only_checked_in_patch_mode() {
        let mut s = RelevanceSettings::default();
        s.unit.patch_size = 0;
        validate_settings(&s).unwrap();
        s.unit.mode = UnitMode::Patch;
        assert_eq!(validate_settings(&s).unwrap_err().field(), Some("unit.patch_size"));
    }

    #[test]
    fn zero_samples_left_to_the_engine() {
        let s = RelevanceSettings {
            num_samples: 0,
            ..Default::default()
        };
        validate_settings(&s).unwrap();
    }

    #[test]
    fn version_mismatch() {
        let s = RelevanceSettings {
            schema_version: "0.9.0".into(),
            ..Default::default()
        };
        let err = validate_settings(&s).unwrap_err();
        assert!(matches!(err, ValidationError::VersionMismatch { .. }));
        assert_eq!(err.code(), 66);
    }
}
