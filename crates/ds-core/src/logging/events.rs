//! Structured log event definitions.
//!
//! Every event carries the run id, host id and pipeline stage so JSONL
//! logs from several runs can be interleaved and still be separated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<tracing::Level> for Level {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => Level::Trace,
            tracing::Level::DEBUG => Level::Debug,
            tracing::Level::INFO => Level::Info,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::ERROR => Level::Error,
        }
    }
}

/// Stages of a relevance run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Startup and settings resolution.
    Init,
    /// Reading datasets, locations and the model checkpoint.
    Load,
    /// Shape, layout and domain checks.
    Validate,
    /// Perturbation scoring.
    Score,
    /// Writing maps and bundles.
    Export,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::Load => "load",
            Stage::Validate => "validate",
            Stage::Score => "score",
            Stage::Export => "export",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable event names. Used as the `tracing` target.
pub mod event_names {
    pub const RUN_STARTED: &str = "run.started";
    pub const RUN_FINISHED: &str = "run.finished";

    pub const CONFIG_LOADED: &str = "config.loaded";
    pub const CONFIG_DEFAULT_USED: &str = "config.default_used";
    pub const CONFIG_ERROR: &str = "config.error";

    pub const INPUT_LOADED: &str = "load.input";
    pub const MODEL_LOADED: &str = "load.model";

    pub const VALIDATION_FAILED: &str = "validate.failed";

    pub const SCORE_STARTED: &str = "score.started";
    pub const SCORE_SAMPLE_DONE: &str = "score.sample_done";
    pub const SCORE_SAMPLE_FAILED: &str = "score.sample_failed";
    pub const SCORE_ABORTED: &str = "score.aborted";
    pub const SCORE_FINISHED: &str = "score.finished";

    pub const EXPORT_MAP_WRITTEN: &str = "export.map_written";
    pub const EXPORT_BUNDLE_WRITTEN: &str = "export.bundle_written";

    pub const INTERNAL_ERROR: &str = "internal_error";
}

/// A structured log event in its JSONL form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub ts: DateTime<Utc>,
    pub level: Level,
    /// Event name, e.g. `score.finished`.
    pub event: String,
    pub run_id: String,
    pub host_id: String,
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl LogEvent {
    pub fn new(
        level: Level,
        event: impl Into<String>,
        run_id: impl Into<String>,
        host_id: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        LogEvent {
            ts: Utc::now(),
            level,
            event: event.into(),
            run_id: run_id.into(),
            host_id: host_id.into(),
            stage,
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.fields.insert(key.into(), v);
        }
        self
    }

    pub fn to_jsonl(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"serialization_failed","event":"{}"}}"#,
                self.event
            )
        })
    }
}

/// Correlation ids shared by every event of one invocation.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub run_id: String,
    pub host_id: String,
}

impl LogContext {
    pub fn new(run_id: impl Into<String>, host_id: impl Into<String>) -> Self {
        LogContext {
            run_id: run_id.into(),
            host_id: host_id.into(),
        }
    }

    pub fn event(
        &self,
        level: Level,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        LogEvent::new(level, event, &self.run_id, &self.host_id, stage, message)
    }

    pub fn info(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Info, event, stage, message)
    }

    pub fn warn(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Warn, event, stage, message)
    }

    pub fn error(
        &self,
        event: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
    ) -> LogEvent {
        self.event(Level::Error, event, stage, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event_serialization() {
        let event = LogEvent::new(
            Level::Info,
            event_names::SCORE_FINISHED,
            "ds-20261018-143022-abcd",
            "host-abc",
            Stage::Score,
            "Relevance run finished",
        )
        .with_field("scored", 4);

        let json = event.to_jsonl();
        assert!(json.contains(r#""event":"score.finished""#));
        assert!(json.contains(r#""level":"info""#));
        assert!(json.contains(r#""stage":"score""#));
        assert!(json.contains(r#""scored":4"#));
    }

    #[test]
    fn test_log_context_stamps_ids() {
        let ctx = LogContext::new("ds-20261018-143022-abcd", "host-xyz");
        let event = ctx.warn(event_names::SCORE_SAMPLE_FAILED, Stage::Score, "sample 3 failed");
        assert_eq!(event.run_id, "ds-20261018-143022-abcd");
        assert_eq!(event.host_id, "host-xyz");
        assert_eq!(event.level, Level::Warn);
    }

    #[test]
    fn test_stage_serialization() {
        assert_eq!(serde_json::to_string(&Stage::Validate).unwrap(), "\"validate\"");
        assert_eq!(Stage::Export.to_string(), "export");
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(Level::from(tracing::Level::DEBUG), Level::Debug);
        assert_eq!(Level::from(tracing::Level::ERROR), Level::Error);
    }
}
