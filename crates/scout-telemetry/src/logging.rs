use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A warn+ log record retained in memory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_id: Option<String>,
}

/// Query parameters for searching retained logs.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    pub target: Option<String>,
    pub session_id: Option<String>,
    pub limit: Option<usize>,
}

/// Bounded ring of recent warn+ records. Oldest records are evicted first.
pub struct RecentLogs {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
}

impl RecentLogs {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&self, record: LogRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Newest first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let limit = q.limit.unwrap_or(100);
        self.records
            .lock()
            .iter()
            .rev()
            .filter(|r| q.level.as_deref().map_or(true, |l| r.level.eq_ignore_ascii_case(l)))
            .filter(|r| q.target.as_deref().map_or(true, |t| r.target.contains(t)))
            .filter(|r| {
                q.session_id
                    .as_deref()
                    .map_or(true, |s| r.session_id.as_deref() == Some(s))
            })
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count(&self) -> usize {
        self.records.lock().len()
    }
}

/// tracing Layer that copies warn+ events into a [`RecentLogs`] ring.
pub struct RecentLogsLayer {
    sink: Arc<RecentLogs>,
}

impl RecentLogsLayer {
    pub fn new(sink: Arc<RecentLogs>) -> Self {
        Self { sink }
    }
}

/// Collects every event or span field into a JSON map.
#[derive(Default)]
struct FieldMap(serde_json::Map<String, serde_json::Value>);

impl FieldMap {
    fn of_event(event: &tracing::Event<'_>) -> Self {
        let mut map = Self::default();
        event.record(&mut map);
        map
    }

    fn put(&mut self, field: &Field, value: impl Into<serde_json::Value>) {
        let _ = self.0.insert(field.name().to_string(), value.into());
    }

    /// Remove a field and return it as text.
    fn take_text(&mut self, name: &str) -> Option<String> {
        match self.0.remove(name)? {
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        }
    }
}

impl Visit for FieldMap {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value);
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.put(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value);
    }
}

/// Correlation ids attached to a span, inherited by events inside it.
#[derive(Clone, Default)]
struct Correlation {
    session_id: Option<String>,
    turn_id: Option<String>,
}

impl Correlation {
    fn take_from(fields: &mut FieldMap) -> Self {
        Self {
            session_id: fields.take_text("session_id"),
            turn_id: fields.take_text("turn_id"),
        }
    }

    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.turn_id.is_some()
    }

    fn fill_from(&mut self, outer: &Correlation) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&outer.session_id);
        }
        if self.turn_id.is_none() {
            self.turn_id.clone_from(&outer.turn_id);
        }
    }
}

impl<S> Layer<S> for RecentLogsLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();
        if *meta.level() > tracing::Level::WARN {
            return;
        }

        let mut fields = FieldMap::of_event(event);
        let message = fields.take_text("message").unwrap_or_default();
        let mut ids = Correlation::take_from(&mut fields);

        // Innermost span first.
        for span in ctx.event_scope(event).into_iter().flatten() {
            if ids.is_complete() {
                break;
            }
            if let Some(outer) = span.extensions().get::<Correlation>() {
                ids.fill_from(outer);
            }
        }

        self.sink.push(LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            level: meta.level().as_str().to_string(),
            target: meta.target().to_string(),
            message,
            fields: (!fields.0.is_empty()).then(|| serde_json::Value::Object(fields.0)),
            session_id: ids.session_id,
            turn_id: ids.turn_id,
        });
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut fields = FieldMap::default();
        attrs.record(&mut fields);
        let ids = Correlation::take_from(&mut fields);
        if ids.session_id.is_none() && ids.turn_id.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(ids);
        }
    }
}
