//! Tracing capture for tests that assert on log output.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{dispatcher, Dispatch, Event, Level, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Field value as logged, with debug quoting removed.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|v| v.trim_matches('"').to_string())
    }
}

pub type Captured = Arc<Mutex<Vec<CapturedEvent>>>;

struct Recorder {
    sink: Captured,
}

struct Fields<'a>(&'a mut BTreeMap<String, String>);

impl Visit for Fields<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for Recorder {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut Fields(&mut fields));
        let meta = event.metadata();
        self.sink.lock().unwrap().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
            message: fields.get("message").cloned().unwrap_or_default(),
            fields,
        });
    }
}

/// Capture every event on the current thread until the guard is dropped.
///
/// Use with current-thread runtimes (`#[tokio::test]`) so spawned work stays
/// on the capturing thread.
pub fn install_tracing_capture() -> (Captured, dispatcher::DefaultGuard) {
    let sink: Captured = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry()
        .with(Recorder { sink: sink.clone() })
        .with(LevelFilter::TRACE);
    let guard = dispatcher::set_default(&Dispatch::new(subscriber));
    (sink, guard)
}

/// Events at exactly `level` whose target starts with `target_prefix`.
pub fn events_at(captured: &Captured, level: Level, target_prefix: &str) -> Vec<CapturedEvent> {
    captured
        .lock()
        .unwrap()
        .iter()
        .filter(|e| e.level == level && e.target.starts_with(target_prefix))
        .cloned()
        .collect()
}
