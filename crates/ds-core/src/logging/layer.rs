//! JSONL tracing layer.
//!
//! Writes one JSON object per event on stderr, keeping stdout free for
//! command payloads. Correlation fields recorded on enclosing spans
//! (`run_id`, `host_id`, `stage`) are lifted onto each event.

use std::io::{self, Write};
use std::sync::Mutex;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use super::events::Level;

const CONTEXT_KEYS: [&str; 3] = ["run_id", "host_id", "stage"];

/// Correlation fields stored on a span.
#[derive(Debug, Clone, Default)]
struct SpanContext {
    values: Map<String, Value>,
}

/// Collects event fields into a JSON map.
#[derive(Default)]
struct FieldCollector {
    fields: Map<String, Value>,
    message: Option<String>,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = Some(match value {
                Value::String(s) => s,
                other => other.to_string(),
            });
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, Value::String(value.to_string()));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.insert(field, Value::String(format!("{value:?}")));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // Non-finite floats have no JSON form.
        let json = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.insert(field, json);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, Value::Bool(value));
    }
}

/// JSONL layer writing to stderr or any `Write` sink.
pub struct JsonlLayer<W = io::Stderr> {
    writer: Mutex<W>,
}

impl JsonlLayer<io::Stderr> {
    pub fn stderr() -> Self {
        JsonlLayer::new(io::stderr())
    }
}

impl<W: Write> JsonlLayer<W> {
    pub fn new(writer: W) -> Self {
        JsonlLayer {
            writer: Mutex::new(writer),
        }
    }
}

impl<S, W> Layer<S> for JsonlLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: Write + 'static,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        attrs.record(&mut collector);

        let values = collector
            .fields
            .into_iter()
            .filter(|(k, _)| CONTEXT_KEYS.contains(&k.as_str()))
            .collect();

        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanContext { values });
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let level: Level = (*event.metadata().level()).into();
        let mut obj = Map::new();
        obj.insert("ts".into(), Value::String(Utc::now().to_rfc3339()));
        obj.insert("level".into(), serde_json::json!(level));
        obj.insert("event".into(), Value::String(event.metadata().target().to_string()));

        // Fields on the event win over the innermost span, which wins over outer spans.
        for key in CONTEXT_KEYS {
            if let Some(value) = collector.fields.remove(key) {
                obj.insert(key.into(), value);
            }
        }
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope {
                if let Some(span_ctx) = span.extensions().get::<SpanContext>() {
                    for (key, value) in &span_ctx.values {
                        obj.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
            }
        }

        if let Some(message) = collector.message {
            obj.insert("message".into(), Value::String(message));
        }
        if !collector.fields.is_empty() {
            obj.insert("fields".into(), Value::Object(collector.fields));
        }

        let line = serde_json::to_string(&Value::Object(obj)).unwrap_or_default();
        if let Ok(mut writer) = self.writer.lock() {
            let _ = writeln!(writer, "{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tracing_subscriber::layer::SubscriberExt;

    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn capture<F: FnOnce()>(f: F) -> Vec<Value> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber =
            tracing_subscriber::registry().with(JsonlLayer::new(SharedBuf(buffer.clone())));
        tracing::subscriber::with_default(subscriber, f);

        let bytes = buffer.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_event_fields_and_target() {
        let lines = capture(|| {
            tracing::info!(target: "score.finished", scored = 4u64, partial = false, message = "done");
        });
        assert_eq!(lines.len(), 1);
        let line = &lines[0];
        assert_eq!(line["level"], "info");
        assert_eq!(line["event"], "score.finished");
        assert_eq!(line["message"], "done");
        assert_eq!(line["fields"]["scored"], 4);
        assert_eq!(line["fields"]["partial"], false);
        assert!(line.get("ts").is_some());
    }

    #[test]
    fn test_context_lifted_from_span() {
        let lines = capture(|| {
            let span =
                tracing::info_span!("run", run_id = "ds-20261018-143022-abcd", stage = "score");
            let _guard = span.enter();
            tracing::warn!(target: "score.sample_failed", sample = 2u64, message = "non-finite");
        });
        let line = &lines[0];
        assert_eq!(line["run_id"], "ds-20261018-143022-abcd");
        assert_eq!(line["stage"], "score");
        assert_eq!(line["level"], "warn");
        assert!(line["fields"].get("run_id").is_none());
    }

    #[test]
    fn test_event_context_overrides_span() {
        let lines = capture(|| {
            let span = tracing::info_span!("run", stage = "load");
            let _guard = span.enter();
            tracing::info!(target: "export.map_written", stage = "export", message = "ok");
        });
        assert_eq!(lines[0]["stage"], "export");
    }

    #[test]
    fn test_non_finite_float_is_stringified() {
        let lines = capture(|| {
            tracing::debug!(target: "score.sample_done", score = f64::NAN, message = "nan");
        });
        assert_eq!(lines[0]["fields"]["score"], "NaN");
    }
}
