//! Progress events for relevance runs.
//!
//! Events are small JSON records describing how far a run has come. They
//! are dispatched through the `ProgressEmitter` trait so the engine does
//! not care whether they end up on stderr or in a bundle log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Standard progress event names.
pub mod event_names {
    pub const RELEVANCE_STARTED: &str = "relevance_started";
    pub const SAMPLE_SCORED: &str = "sample_scored";
    pub const SAMPLE_FAILED: &str = "sample_failed";
    pub const RELEVANCE_ABORTED: &str = "relevance_aborted";
    pub const RELEVANCE_COMPLETE: &str = "relevance_complete";
}

/// Pipeline phase of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Validate,
    Score,
    Export,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub event: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
}

impl ProgressEvent {
    pub fn new(event: impl Into<String>, phase: Phase) -> Self {
        Self {
            event: event.into(),
            timestamp: Utc::now(),
            run_id: None,
            phase,
            progress: None,
            elapsed_ms: None,
            details: BTreeMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_progress(mut self, current: u64, total: Option<u64>) -> Self {
        self.progress = Some(Progress { current, total });
        self
    }

    pub fn with_elapsed_ms(mut self, elapsed_ms: u64) -> Self {
        self.elapsed_ms = Some(elapsed_ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.insert(key.into(), v);
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

/// Sink for progress events. Implementations must tolerate calls from
/// several worker threads.
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Writes each event as one JSON line.
pub struct JsonlWriter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ProgressEmitter for JsonlWriter<W> {
    fn emit(&self, event: ProgressEvent) {
        let line = event.to_jsonl();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }
}

/// Forwards every event to several emitters.
pub struct FanoutEmitter {
    emitters: Vec<Arc<dyn ProgressEmitter>>,
}

impl FanoutEmitter {
    pub fn new(emitters: Vec<Arc<dyn ProgressEmitter>>) -> Self {
        Self { emitters }
    }
}

impl ProgressEmitter for FanoutEmitter {
    fn emit(&self, event: ProgressEvent) {
        for emitter in &self.emitters {
            emitter.emit(event.clone());
        }
    }
}

/// Buffers events in memory, e.g. to bundle them after a run.
#[derive(Debug, Default)]
pub struct MemoryEmitter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemoryEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// All buffered events as JSONL bytes.
    pub fn to_jsonl_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for event in self.events() {
            out.extend_from_slice(event.to_jsonl().as_bytes());
            out.push(b'\n');
        }
        out
    }
}

impl ProgressEmitter for MemoryEmitter {
    fn emit(&self, event: ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_event_jsonl() {
        let json = ProgressEvent::new(event_names::SAMPLE_SCORED, Phase::Score)
            .with_run_id("ds-20261018-143022-abcd")
            .with_progress(3, Some(12))
            .with_elapsed_ms(40)
            .with_detail("sample", 2)
            .to_jsonl();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["event"], "sample_scored");
        assert_eq!(value["phase"], "score");
        assert_eq!(value["progress"]["total"], 12);
        assert_eq!(value["details"]["sample"], 2);
    }

    #[test]
    fn test_jsonl_writer_and_fanout() {
        let memory = Arc::new(MemoryEmitter::new());
        let sink: Arc<dyn ProgressEmitter> = memory.clone();
        let fanout = FanoutEmitter::new(vec![sink.clone(), sink]);
        fanout.emit(ProgressEvent::new(event_names::RELEVANCE_COMPLETE, Phase::Score));
        assert_eq!(memory.events().len(), 2);

        let writer = JsonlWriter::new(Vec::new());
        writer.emit(ProgressEvent::new(event_names::RELEVANCE_ABORTED, Phase::Score));
        let text = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("relevance_aborted"));
    }
}
