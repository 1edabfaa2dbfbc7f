//! Durable/observable error log collaborator.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::error;

/// Structured fields attached to a logged error.
pub type Fields = [(&'static str, String)];

/// Sink for errors the reconciliation core wants operators to see.
///
/// Recording is fire-and-forget: implementations must not block for long and
/// must never fail the caller.
pub trait EventLog: Send + Sync {
    /// Record an error message tagged with its source and structured fields.
    fn record_error(&self, message: &str, source: &str, fields: &Fields);
}

/// Field names emitted as their own tracing fields.
const NAMED_FIELDS: [&str; 4] = ["err", "kind", "action", "key"];

fn field_value<'a>(fields: &'a Fields, name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.as_str())
}

/// Fields without a dedicated tracing field, as `name=value` pairs.
fn format_extra_fields(fields: &Fields) -> String {
    fields
        .iter()
        .filter(|(name, _)| !NAMED_FIELDS.contains(name))
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Event log backed by `tracing` at error level.
///
/// `err`, `kind`, `action` and `key` become individual fields so collectors
/// can filter on them; anything else is folded into `extra`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn record_error(&self, message: &str, source: &str, fields: &Fields) {
        error!(
            source,
            err = field_value(fields, "err"),
            kind = field_value(fields, "kind"),
            action = field_value(fields, "action"),
            key = field_value(fields, "key"),
            extra = %format_extra_fields(fields),
            "{}",
            message
        );
    }
}

/// One entry kept by [`BufferedEventLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedError {
    /// Human readable message.
    pub message: String,
    /// Reporting component and operation.
    pub source: String,
    /// Structured context.
    pub fields: Vec<(&'static str, String)>,
    /// When the entry was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl LoggedError {
    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&str> {
        field_value(&self.fields, name)
    }
}

/// Event log that keeps the most recent entries in memory and also emits them
/// through `tracing`.
///
/// Older entries are dropped once `capacity` is reached.
///
/// # Examples
///
/// ```rust
/// use config_reconciler::notify::{BufferedEventLog, EventLog};
///
/// let log = BufferedEventLog::new(16);
/// log.record_error("Unexpected watcher error", "manager.run", &[("err", "boom".to_string())]);
/// assert_eq!(log.len(), 1);
/// assert_eq!(log.entries()[0].field("err"), Some("boom"));
/// ```
#[derive(Debug, Clone)]
pub struct BufferedEventLog {
    entries: Arc<Mutex<VecDeque<LoggedError>>>,
    capacity: usize,
}

impl BufferedEventLog {
    /// Create a log keeping at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<LoggedError> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded (or everything was cleared).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all retained entries.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl EventLog for BufferedEventLog {
    fn record_error(&self, message: &str, source: &str, fields: &Fields) {
        TracingEventLog.record_error(message, source, fields);

        let mut entries = self.entries.lock();
        entries.push_back(LoggedError {
            message: message.to_string(),
            source: source.to_string(),
            fields: fields.to_vec(),
            recorded_at: Utc::now(),
        });
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }
}
