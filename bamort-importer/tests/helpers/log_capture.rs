//! Log Capture Utilities for Testing
//!
//! Collects tracing events, with their structured fields, for the current
//! thread only. `#[tokio::test]` runs on a single thread, so everything an
//! async test awaits is captured.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::subscriber::DefaultGuard;
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;

/// Captured event
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

#[derive(Clone, Default)]
pub struct LogCapture {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl LogCapture {
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().unwrap().clone()
    }

    /// First event whose message contains `pattern`
    pub fn find(&self, pattern: &str) -> Option<LogRecord> {
        self.records().into_iter().find(|r| r.message.contains(pattern))
    }

    pub fn assert_contains(&self, pattern: &str) -> LogRecord {
        self.find(pattern).unwrap_or_else(|| {
            panic!(
                "Expected log matching '{}', but none found. All logs:\n{}",
                pattern,
                self.records()
                    .iter()
                    .map(|r| r.message.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            )
        })
    }
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: tracing_subscriber::layer::Context<'_, S>) {
        use tracing::field::{Field, Visit};

        #[derive(Default)]
        struct Collector {
            message: String,
            fields: BTreeMap<String, String>,
        }

        impl Visit for Collector {
            fn record_str(&mut self, field: &Field, value: &str) {
                if field.name() == "message" {
                    self.message = value.to_string();
                } else {
                    self.fields.insert(field.name().to_string(), value.to_string());
                }
            }

            fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
                let text = format!("{:?}", value);
                if field.name() == "message" {
                    self.message = text;
                } else {
                    self.fields.insert(field.name().to_string(), text);
                }
            }
        }

        let mut collector = Collector::default();
        event.record(&mut collector);

        self.records.lock().unwrap().push(LogRecord {
            level: *event.metadata().level(),
            message: collector.message,
            fields: collector.fields,
        });
    }
}

/// Capture events until the returned guard is dropped
pub fn capture_logs() -> (LogCapture, DefaultGuard) {
    let capture = LogCapture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}
