//! Fault escalation toward the supervising component.

use crate::error::ReconcileError;
use crate::notify::event_log::EventLog;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

#[cfg(feature = "metrics")]
use crate::metrics::ReconcilerMetrics;

/// Classification tag the supervisor uses to pick a remedial policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaultKind {
    /// The watch call returned a non-cancellation error.
    #[serde(rename = "WATCH_STREAM_ERROR")]
    WatchStreamError,
    /// A notification carried an action that maps to no directive.
    #[serde(rename = "BAD_ACTION")]
    UnrecognizedAction,
    /// The dispatch backlog was full and a directive was refused.
    #[serde(rename = "DISPATCH_OVERFLOW")]
    DispatchOverflow,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WatchStreamError => f.write_str("WATCH_STREAM_ERROR"),
            Self::UnrecognizedAction => f.write_str("BAD_ACTION"),
            Self::DispatchOverflow => f.write_str("DISPATCH_OVERFLOW"),
        }
    }
}

/// A fault sent to the supervisor.
#[derive(Debug, Clone)]
pub struct FaultReport {
    /// Underlying cause.
    pub error: ReconcileError,
    /// `<component>.<operation>` that reported it.
    pub source: String,
    /// Classification tag.
    pub kind: FaultKind,
    /// When the fault was reported.
    pub reported_at: DateTime<Utc>,
}

/// Create the bounded channel a supervisor reads fault reports from.
pub fn fault_channel(capacity: usize) -> (mpsc::Sender<FaultReport>, mpsc::Receiver<FaultReport>) {
    mpsc::channel(capacity.max(1))
}

/// Records faults in the event log and forwards them to the supervisor.
///
/// Sending never waits: if the supervisor's channel is full or gone, the report
/// is dropped, counted, and a warning is logged.
#[derive(Clone)]
pub struct EscalationReporter {
    component: String,
    log: Arc<dyn EventLog>,
    supervisor: mpsc::Sender<FaultReport>,
    escalate_unrecognized: bool,
    dropped: Arc<AtomicU64>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReconcilerMetrics>,
}

impl EscalationReporter {
    /// Create a reporter for `component` (e.g., `"manager"`).
    pub fn new(
        component: impl Into<String>,
        log: Arc<dyn EventLog>,
        supervisor: mpsc::Sender<FaultReport>,
    ) -> Self {
        Self {
            component: component.into(),
            log,
            supervisor,
            escalate_unrecognized: false,
            dropped: Arc::new(AtomicU64::new(0)),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Also send unrecognized actions to the supervisor.
    pub fn with_unrecognized_escalation(mut self, enabled: bool) -> Self {
        self.escalate_unrecognized = enabled;
        self
    }

    /// Attach metrics.
    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<ReconcilerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Log a fault and send it to the supervisor.
    pub fn report(&self, error: ReconcileError, operation: &str, kind: FaultKind) {
        let source = self.source_for(operation);
        let message = match kind {
            FaultKind::DispatchOverflow => "Dropped a directive, dispatch backlog is full",
            _ => "Unexpected watcher error",
        };
        self.log.record_error(
            message,
            &source,
            &[("err", error.to_string()), ("kind", kind.to_string())],
        );

        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_fault(kind);
        }

        self.send(FaultReport {
            error,
            source,
            kind,
            reported_at: Utc::now(),
        });
    }

    /// Log an unrecognized action. It only reaches the supervisor when
    /// escalation of unrecognized actions is enabled.
    pub fn record_unrecognized_action(&self, error: ReconcileError, operation: &str) {
        let source = self.source_for(operation);
        let mut fields = vec![("err", error.to_string())];
        if let ReconcileError::UnrecognizedAction { action, key } = &error {
            fields.push(("action", action.clone()));
            fields.push(("key", key.clone()));
        }
        self.log
            .record_error("Received an unrecognized action -> skipping", &source, &fields);

        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_unrecognized_action();
        }

        if self.escalate_unrecognized {
            self.send(FaultReport {
                error,
                source,
                kind: FaultKind::UnrecognizedAction,
                reported_at: Utc::now(),
            });
        }
    }

    /// Number of reports that could not be delivered.
    pub fn dropped_reports(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn source_for(&self, operation: &str) -> String {
        format!("{}.{}", self.component, operation)
    }

    fn send(&self, report: FaultReport) {
        let reason = match self.supervisor.try_send(report) {
            Ok(()) => return,
            Err(TrySendError::Full(_)) => "supervisor channel full",
            Err(TrySendError::Closed(_)) => "supervisor channel closed",
        };

        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(component = %self.component, reason, dropped, "Dropped fault report");

        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_dropped_report();
        }
    }
}

impl fmt::Debug for EscalationReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EscalationReporter")
            .field("component", &self.component)
            .field("escalate_unrecognized", &self.escalate_unrecognized)
            .field("dropped", &self.dropped_reports())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::notify::event_log::BufferedEventLog;

    fn reporter(capacity: usize) -> (EscalationReporter, BufferedEventLog, mpsc::Receiver<FaultReport>) {
        let log = BufferedEventLog::new(16);
        let (tx, rx) = fault_channel(capacity);
        (EscalationReporter::new("manager", Arc::new(log.clone()), tx), log, rx)
    }

    #[test]
    fn test_fault_kind_display() {
        assert_eq!(FaultKind::WatchStreamError.to_string(), "WATCH_STREAM_ERROR");
        assert_eq!(FaultKind::UnrecognizedAction.to_string(), "BAD_ACTION");
        assert_eq!(FaultKind::DispatchOverflow.to_string(), "DISPATCH_OVERFLOW");
    }

    #[tokio::test]
    async fn test_report_logs_and_sends() {
        let (reporter, log, mut rx) = reporter(4);

        reporter.report(
            WatchError::Unavailable("leader lost".into()).into(),
            "run",
            FaultKind::WatchStreamError,
        );

        let report = rx.try_recv().unwrap();
        assert_eq!(report.source, "manager.run");
        assert_eq!(report.kind, FaultKind::WatchStreamError);
        assert!(matches!(
            report.error,
            ReconcileError::Watch(WatchError::Unavailable(_))
        ));

        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source, "manager.run");
        assert!(entries[0].field("err").unwrap().contains("leader lost"));
    }

    #[test]
    fn test_full_channel_drops_without_blocking() {
        let (reporter, log, _rx) = reporter(1);

        for _ in 0..3 {
            reporter.report(WatchError::Closed.into(), "run", FaultKind::WatchStreamError);
        }

        assert_eq!(reporter.dropped_reports(), 2);
        // Every fault still reaches the event log.
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_closed_channel_drops() {
        let (reporter, _log, rx) = reporter(4);
        drop(rx);

        reporter.report(WatchError::Closed.into(), "run", FaultKind::WatchStreamError);
        assert_eq!(reporter.dropped_reports(), 1);
    }

    #[test]
    fn test_unrecognized_action_stays_local_by_default() {
        let (reporter, log, mut rx) = reporter(4);

        reporter.record_unrecognized_action(
            ReconcileError::UnrecognizedAction {
                action: "expire".into(),
                key: "cluster/members/m1/config/a".into(),
            },
            "run",
        );

        assert!(rx.try_recv().is_err());
        let entries = log.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].field("action"), Some("expire"));
    }

    #[test]
    fn test_unrecognized_action_escalates_when_enabled() {
        let (reporter, _log, mut rx) = reporter(4);
        let reporter = reporter.with_unrecognized_escalation(true);

        reporter.record_unrecognized_action(
            ReconcileError::UnrecognizedAction {
                action: "expire".into(),
                key: "k".into(),
            },
            "run",
        );

        let report = rx.try_recv().unwrap();
        assert_eq!(report.kind, FaultKind::UnrecognizedAction);
    }
}
