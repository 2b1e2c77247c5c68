//! Error types for relevance-map computation.
//!
//! This module provides structured error handling with:
//! - Stable error codes for machine parsing
//! - Category classification (configuration, domain, numerical, model, run, I/O)
//! - A fatal flag separating run-stopping errors from per-sample failures
//! - Remediation suggestions for humans
//!
//! # Human-Facing Output
//!
//! ```text
//! ✗ Location Outside Grid
//!   Reason: output location (lon=40.1, lat=2.0) lies outside the training grid ...
//!   Fix: Pick locations inside the model's training grid ...
//! ```
//!
//! # Agent-Facing Output
//!
//! ```json
//! {
//!   "code": 20,
//!   "category": "domain",
//!   "message": "output location (lon=40.1, lat=2.0) lies outside ...",
//!   "fatal": true,
//!   "suggested_action": "fix_input",
//!   "context": { "lon": 40.1, "lat": 2.0 }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Result type alias for relevance operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Settings, shapes, and model/loss layout disagreements.
    Config,
    /// Requests that are well-formed but meaningless for the grid.
    Domain,
    /// Non-finite values during scoring.
    Numerical,
    /// Failures raised by the predictive model.
    Model,
    /// Run lifecycle (abort, timeout).
    Run,
    /// File I/O and serialization errors.
    Io,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::Config => write!(f, "config"),
            ErrorCategory::Domain => write!(f, "domain"),
            ErrorCategory::Numerical => write!(f, "numerical"),
            ErrorCategory::Model => write!(f, "model"),
            ErrorCategory::Run => write!(f, "run"),
            ErrorCategory::Io => write!(f, "io"),
        }
    }
}

/// Suggested actions for callers to take in response to errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Retry the operation.
    Retry,
    /// Run configuration validation.
    RunCheck,
    /// Correct the input files or arguments.
    FixInput,
    /// Skip this item and continue.
    Skip,
    /// Abort the operation.
    Abort,
    /// Manual intervention required.
    ManualIntervention,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuggestedAction::Retry => write!(f, "retry"),
            SuggestedAction::RunCheck => write!(f, "run_check"),
            SuggestedAction::FixInput => write!(f, "fix_input"),
            SuggestedAction::Skip => write!(f, "skip"),
            SuggestedAction::Abort => write!(f, "abort"),
            SuggestedAction::ManualIntervention => write!(f, "manual_intervention"),
        }
    }
}

/// Unified error type for relevance computation.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (10-19)
    #[error("configuration error: {0}")]
    Config(String),

    #[error("shape mismatch for {what}: expected {expected}, got {actual}")]
    ShapeMismatch {
        what: String,
        expected: String,
        actual: String,
    },

    #[error("model emits {actual} values per sample but the loss expects {expected} ({params} parameters x {locations} locations)")]
    ParameterLayout {
        expected: usize,
        actual: usize,
        params: usize,
        locations: usize,
    },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    // Domain errors (20-29)
    #[error("output location (lon={lon}, lat={lat}) lies outside the training grid {extent}")]
    LocationOutsideGrid { lon: f64, lat: f64, extent: String },

    #[error("num_samples must be at least 1, got {num_samples}")]
    InvalidSampleCount { num_samples: usize },

    #[error("empty input: {0}")]
    EmptyInput(String),

    // Numerical errors (30-39)
    #[error("numerical instability in sample {sample}: {detail}")]
    NumericalInstability { sample: usize, detail: String },

    // Model errors (40-49)
    #[error("model prediction failed: {0}")]
    Prediction(String),

    // Run errors (50-59)
    #[error("run aborted: {reason}")]
    Aborted { reason: String },

    // I/O errors (60-69)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns the error code for this error type.
    ///
    /// Error codes are stable and grouped by category:
    /// - 10-19: Configuration errors
    /// - 20-29: Domain errors
    /// - 30-39: Numerical errors
    /// - 40-49: Model errors
    /// - 50-59: Run errors
    /// - 60-69: I/O errors
    pub fn code(&self) -> u32 {
        match self {
            Error::Config(_) => 10,
            Error::ShapeMismatch { .. } => 11,
            Error::ParameterLayout { .. } => 12,
            Error::InvalidSettings(_) => 13,
            Error::LocationOutsideGrid { .. } => 20,
            Error::InvalidSampleCount { .. } => 21,
            Error::EmptyInput(_) => 22,
            Error::NumericalInstability { .. } => 30,
            Error::Prediction(_) => 40,
            Error::Aborted { .. } => 50,
            Error::Io(_) => 60,
            Error::Json(_) => 61,
        }
    }

    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_)
            | Error::ShapeMismatch { .. }
            | Error::ParameterLayout { .. }
            | Error::InvalidSettings(_) => ErrorCategory::Config,

            Error::LocationOutsideGrid { .. }
            | Error::InvalidSampleCount { .. }
            | Error::EmptyInput(_) => ErrorCategory::Domain,

            Error::NumericalInstability { .. } => ErrorCategory::Numerical,
            Error::Prediction(_) => ErrorCategory::Model,
            Error::Aborted { .. } => ErrorCategory::Run,
            Error::Io(_) | Error::Json(_) => ErrorCategory::Io,
        }
    }

    /// Returns whether this error stops the whole run.
    ///
    /// Configuration, domain and I/O errors are raised before scoring starts.
    /// Numerical and model errors are recorded against a single sample.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Numerical | ErrorCategory::Model | ErrorCategory::Run
        )
    }

    /// Returns the suggested action for automated callers.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self {
            Error::Config(_) | Error::InvalidSettings(_) => SuggestedAction::RunCheck,
            Error::ShapeMismatch { .. } | Error::ParameterLayout { .. } => {
                SuggestedAction::FixInput
            }

            Error::LocationOutsideGrid { .. }
            | Error::InvalidSampleCount { .. }
            | Error::EmptyInput(_) => SuggestedAction::FixInput,

            Error::NumericalInstability { .. } => SuggestedAction::Skip,
            Error::Prediction(_) => SuggestedAction::Skip,
            Error::Aborted { .. } => SuggestedAction::Retry,

            Error::Io(_) => SuggestedAction::Retry,
            Error::Json(_) => SuggestedAction::ManualIntervention,
        }
    }

    /// Returns a human-readable remediation hint.
    pub fn remediation(&self) -> &'static str {
        match self {
            Error::Config(_) => {
                "Run 'ds-core config validate' to check the settings file."
            }
            Error::ShapeMismatch { .. } => {
                "Regrid the inputs to the model's training template so rows, columns and channels match."
            }
            Error::ParameterLayout { .. } => {
                "Choose the loss the model was trained with ('--loss bernoulli_gamma' or '--loss gaussian') and check the location list."
            }
            Error::InvalidSettings(_) => {
                "Fix the reported setting, or start from a preset with 'ds-core config presets'."
            }

            Error::LocationOutsideGrid { .. } => {
                "Pick locations inside the model's training grid, or retrain on a larger domain."
            }
            Error::InvalidSampleCount { .. } => {
                "Pass '--samples' with a value of at least 1."
            }
            Error::EmptyInput(_) => {
                "Provide at least one test sample, one baseline time step and one output location."
            }

            Error::NumericalInstability { .. } => {
                "The sample produced non-finite scores. Check the inputs for NaN or extreme values."
            }
            Error::Prediction(_) => {
                "The model failed on this sample. Verify the checkpoint matches the input layout."
            }
            Error::Aborted { .. } => {
                "The run was interrupted. Re-run with a longer '--timeout' or fewer samples."
            }

            Error::Io(_) => {
                "Check that the path exists and is readable, and that there is disk space for outputs."
            }
            Error::Json(_) => {
                "Invalid JSON in file. Check syntax with 'jq . <file>'."
            }
        }
    }

    /// Returns a short headline for human-readable output.
    pub fn headline(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration Error",
            Error::ShapeMismatch { .. } => "Shape Mismatch",
            Error::ParameterLayout { .. } => "Model/Loss Parameter Mismatch",
            Error::InvalidSettings(_) => "Invalid Settings",

            Error::LocationOutsideGrid { .. } => "Location Outside Grid",
            Error::InvalidSampleCount { .. } => "Invalid Sample Count",
            Error::EmptyInput(_) => "Empty Input",

            Error::NumericalInstability { .. } => "Numerical Instability",
            Error::Prediction(_) => "Model Prediction Failed",
            Error::Aborted { .. } => "Run Aborted",

            Error::Io(_) => "I/O Error",
            Error::Json(_) => "JSON Parse Error",
        }
    }
}

/// Structured error response for JSON output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Stable error code.
    pub code: u32,

    /// Error category for grouping.
    pub category: ErrorCategory,

    /// Human-readable error message.
    pub message: String,

    /// Whether the error stopped the run.
    pub fatal: bool,

    /// Suggested action for automated callers.
    pub suggested_action: SuggestedAction,

    /// Additional structured context (e.g., sample index, coordinates).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl From<&Error> for StructuredError {
    fn from(err: &Error) -> Self {
        let mut context = HashMap::new();

        match err {
            Error::ShapeMismatch {
                what,
                expected,
                actual,
            } => {
                context.insert("what".to_string(), serde_json::json!(what));
                context.insert("expected".to_string(), serde_json::json!(expected));
                context.insert("actual".to_string(), serde_json::json!(actual));
            }
            Error::ParameterLayout {
                expected, actual, ..
            } => {
                context.insert("expected_len".to_string(), serde_json::json!(expected));
                context.insert("actual_len".to_string(), serde_json::json!(actual));
            }
            Error::LocationOutsideGrid { lon, lat, .. } => {
                context.insert("lon".to_string(), serde_json::json!(lon));
                context.insert("lat".to_string(), serde_json::json!(lat));
            }
            Error::InvalidSampleCount { num_samples } => {
                context.insert("num_samples".to_string(), serde_json::json!(num_samples));
            }
            Error::NumericalInstability { sample, .. } => {
                context.insert("sample".to_string(), serde_json::json!(sample));
            }
            _ => {}
        }

        StructuredError {
            code: err.code(),
            category: err.category(),
            message: err.to_string(),
            fatal: err.is_fatal(),
            suggested_action: err.suggested_action(),
            context,
        }
    }
}

impl StructuredError {
    /// Add additional context to the error.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"code":{},"error":"serialization_failed"}}"#, self.code)
        })
    }

    /// Serialize to pretty JSON string.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.to_json())
    }
}

/// Result of a batch operation that may have partial success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult<T> {
    /// Successfully completed items.
    pub succeeded: Vec<T>,

    /// Failed items with their errors.
    pub failed: Vec<BatchError>,

    /// Summary statistics.
    pub summary: BatchSummary,
}

/// A single error in a batch operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchError {
    /// Index or identifier of the failed item.
    pub item_id: String,

    /// The structured error.
    pub error: StructuredError,
}

/// Summary of batch operation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Total items attempted.
    pub total: usize,

    /// Number of successful items.
    pub succeeded: usize,

    /// Number of failed items.
    pub failed: usize,

    /// Whether all items succeeded.
    pub all_succeeded: bool,

    /// Whether any items succeeded.
    pub any_succeeded: bool,
}

impl<T> BatchResult<T> {
    /// Create a new batch result from succeeded and failed items.
    pub fn new(succeeded: Vec<T>, failed: Vec<BatchError>) -> Self {
        let total = succeeded.len() + failed.len();
        let succeeded_count = succeeded.len();
        let failed_count = failed.len();

        BatchResult {
            succeeded,
            failed,
            summary: BatchSummary {
                total,
                succeeded: succeeded_count,
                failed: failed_count,
                all_succeeded: failed_count == 0,
                any_succeeded: succeeded_count > 0,
            },
        }
    }

    /// Add a failure to the batch result.
    pub fn add_failure(&mut self, item_id: impl Into<String>, error: &Error) {
        self.failed.push(BatchError {
            item_id: item_id.into(),
            error: StructuredError::from(error),
        });
        self.summary.failed += 1;
        self.summary.total += 1;
        self.summary.all_succeeded = false;
    }

    /// Add a success to the batch result.
    pub fn add_success(&mut self, item: T) {
        self.succeeded.push(item);
        self.summary.succeeded += 1;
        self.summary.total += 1;
        self.summary.any_succeeded = true;
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new(Vec::new(), Vec::new())
    }
}

/// Format an error for human-readable stderr output.
///
/// Output format:
/// ```text
/// ✗ [Headline]
///   Reason: [Error message]
///   Fix: [Remediation hint]
/// ```
pub fn format_error_human(err: &Error, use_color: bool) -> String {
    let (red, cyan, reset) = if use_color {
        ("\x1b[31m", "\x1b[36m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    format!(
        "{red}✗{reset} {headline}\n  Reason: {message}\n  {cyan}Fix:{reset} {remediation}",
        headline = err.headline(),
        message = err,
        remediation = err.remediation()
    )
}

/// Format a batch result for human-readable stderr output.
pub fn format_batch_human<T>(result: &BatchResult<T>, use_color: bool) -> String {
    let (green, red, reset) = if use_color {
        ("\x1b[32m", "\x1b[31m", "\x1b[0m")
    } else {
        ("", "", "")
    };

    let mut output = String::new();

    if result.summary.all_succeeded {
        output.push_str(&format!(
            "{green}✓{reset} All {} samples scored\n",
            result.summary.total
        ));
    } else if result.summary.any_succeeded {
        output.push_str(&format!(
            "Partial success: {} of {} samples scored\n",
            result.summary.succeeded, result.summary.total
        ));
    } else {
        output.push_str(&format!(
            "{red}✗{reset} All {} samples failed\n",
            result.summary.total
        ));
    }

    if !result.failed.is_empty() {
        output.push_str("\nErrors:\n");
        for batch_err in &result.failed {
            output.push_str(&format!(
                "  {red}✗{reset} {}: {}\n",
                batch_err.item_id, batch_err.error.message
            ));
        }
    }

    output
}
