//! Structured logging for ds-core.
//!
//! Two output modes on stderr:
//! - human-readable console lines for interactive use
//! - JSONL for pipelines and agents
//!
//! stdout is reserved for command payloads (map documents, summaries).
//!
//! ```ignore
//! use ds_core::log_event;
//! use ds_core::logging::{event_names, init_logging, LogConfig, LogContext, Stage};
//!
//! init_logging(&LogConfig::from_env(None, None));
//! let ctx = LogContext::new(run_id.as_str(), get_host_id());
//! log_event!(ctx, INFO, event_names::RUN_STARTED, Stage::Init, "Starting relevance run");
//! ```

pub mod config;
pub mod events;
pub mod layer;

pub use config::{LogConfig, LogFormat, LogLevel};
pub use events::{event_names, Level, LogContext, LogEvent, Stage};
pub use layer::JsonlLayer;

use sha2::{Digest, Sha256};
use std::io::IsTerminal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` directives, when present and valid, replace the level from
/// `config`. Calling this twice is a no-op for the second call.
pub fn init_logging(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(config.level)));

    let result = match config.format {
        LogFormat::Human => {
            let fmt_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_ansi(std::io::stderr().is_terminal());

            if config.timestamps {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init()
            } else {
                tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer.without_time())
                    .try_init()
            }
        }
        LogFormat::Jsonl => tracing_subscriber::registry()
            .with(filter)
            .with(JsonlLayer::stderr())
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("logging already initialized");
    }
}

/// Filter directives for the workspace crates at `level`.
///
/// Event names are used as targets, so the filter keys on levels rather
/// than module paths.
fn default_directives(level: LogLevel) -> String {
    level.to_string()
}

/// Host identifier for log correlation and bundle manifests.
///
/// Uses the machine id when readable, a hash of the hostname otherwise.
pub fn get_host_id() -> String {
    if let Ok(id) = std::fs::read_to_string("/etc/machine-id") {
        let id = id.trim();
        if id.len() >= 8 && id.is_char_boundary(8) {
            return format!("host-{}", &id[..8]);
        }
    }

    if let Ok(hostname) = std::env::var("HOSTNAME") {
        if !hostname.is_empty() {
            let digest = Sha256::digest(hostname.as_bytes());
            return format!("host-{}", &hex::encode(digest)[..8]);
        }
    }

    format!("host-{}", &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Log a structured event stamped with run id, host id and stage.
///
/// ```ignore
/// log_event!(ctx, INFO, event_names::SCORE_STARTED, Stage::Score, "Scoring",
///     samples = 12, units = 4);
/// ```
#[macro_export]
macro_rules! log_event {
    ($ctx:expr, INFO, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::info!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
    ($ctx:expr, DEBUG, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::debug!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
    ($ctx:expr, WARN, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::warn!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
    ($ctx:expr, ERROR, $event:expr, $stage:expr, $msg:expr $(, $key:ident = $val:expr)*) => {
        tracing::error!(
            target: $event,
            run_id = %$ctx.run_id,
            host_id = %$ctx.host_id,
            stage = %$stage,
            message = $msg,
            $($key = $val,)*
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_host_id() {
        let host_id = get_host_id();
        assert!(host_id.starts_with("host-"));
        assert_eq!(host_id.len(), 13);
    }

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(LogLevel::Debug), "debug");
        assert_eq!(default_directives(LogLevel::Off), "off");
    }

    #[test]
    fn test_log_event_macro_reaches_layer() {
        use std::sync::{Arc, Mutex};
        use tracing_subscriber::layer::SubscriberExt;

        struct Buf(Arc<Mutex<Vec<u8>>>);
        impl std::io::Write for Buf {
            fn write(&mut self, b: &[u8]) -> std::io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(b);
                Ok(b.len())
            }
            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let subscriber = tracing_subscriber::registry().with(JsonlLayer::new(Buf(buffer.clone())));
        let ctx = LogContext::new("ds-20261018-143022-abcd", "host-12345678");

        tracing::subscriber::with_default(subscriber, || {
            crate::log_event!(
                ctx,
                INFO,
                event_names::SCORE_STARTED,
                Stage::Score,
                "Scoring",
                samples = 3u64
            );
        });

        let out = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
        let line: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(line["event"], "score.started");
        assert_eq!(line["run_id"], "ds-20261018-143022-abcd");
        assert_eq!(line["host_id"], "host-12345678");
        assert_eq!(line["stage"], "score");
        assert_eq!(line["fields"]["samples"], 3);
    }
}
