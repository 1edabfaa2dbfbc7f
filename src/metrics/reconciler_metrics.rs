//! Reconciliation metrics tracking using OpenTelemetry.

use crate::core::{Command, IgnoreReason};
use crate::notify::FaultKind;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Meter};

/// Metrics collector for the watch-reconcile loop.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reconciler::metrics::ReconcilerMetrics;
/// use opentelemetry::global;
///
/// let metrics = ReconcilerMetrics::new(global::meter("reconciler"));
/// metrics.record_event_received();
/// ```
#[derive(Clone)]
pub struct ReconcilerMetrics {
    events_received: Counter<u64>,
    events_ignored: Counter<u64>,
    directives_dispatched: Counter<u64>,
    faults_reported: Counter<u64>,
    reports_dropped: Counter<u64>,
    unrecognized_actions: Counter<u64>,
    dispatch_panics: Counter<u64>,
}

impl ReconcilerMetrics {
    /// Create a new metrics collector with the provided meter.
    pub fn new(meter: Meter) -> Self {
        let events_received = meter
            .u64_counter("config_reconciler.events.received")
            .with_description("Watch notifications received, including anomalies")
            .build();

        let events_ignored = meter
            .u64_counter("config_reconciler.events.ignored")
            .with_description("Watch notifications dropped by the classifier")
            .build();

        let directives_dispatched = meter
            .u64_counter("config_reconciler.directives.dispatched")
            .with_description("Lifecycle directives handed to the monitor registry")
            .build();

        let faults_reported = meter
            .u64_counter("config_reconciler.faults.reported")
            .with_description("Faults escalated toward the supervisor")
            .build();

        let reports_dropped = meter
            .u64_counter("config_reconciler.faults.dropped")
            .with_description("Fault reports dropped because the supervisor channel was full or closed")
            .build();

        let unrecognized_actions = meter
            .u64_counter("config_reconciler.events.unrecognized")
            .with_description("Notifications with an action that maps to no directive")
            .build();

        let dispatch_panics = meter
            .u64_counter("config_reconciler.directives.panics")
            .with_description("Registry calls that panicked")
            .build();

        Self {
            events_received,
            events_ignored,
            directives_dispatched,
            faults_reported,
            reports_dropped,
            unrecognized_actions,
            dispatch_panics,
        }
    }

    /// Count a notification or error returned by the watch stream.
    pub fn record_event_received(&self) {
        self.events_received.add(1, &[]);
    }

    /// Count a dropped notification.
    pub fn record_event_ignored(&self, reason: IgnoreReason) {
        let reason = match reason {
            IgnoreReason::NilEvent => "nil",
            IgnoreReason::MalformedKey => "malformed_key",
            IgnoreReason::OutOfScope => "out_of_scope",
            IgnoreReason::ConfigContainer => "config_container",
        };
        self.events_ignored.add(1, &[KeyValue::new("reason", reason)]);
    }

    /// Count a dispatched directive.
    pub fn record_dispatch(&self, command: Command) {
        self.directives_dispatched
            .add(1, &[KeyValue::new("command", command.to_string())]);
    }

    /// Count a panicking registry call.
    pub fn record_dispatch_panic(&self) {
        self.dispatch_panics.add(1, &[]);
    }

    /// Count an escalated fault.
    pub fn record_fault(&self, kind: FaultKind) {
        self.faults_reported
            .add(1, &[KeyValue::new("kind", kind.to_string())]);
    }

    /// Count a fault report that never reached the supervisor.
    pub fn record_dropped_report(&self) {
        self.reports_dropped.add(1, &[]);
    }

    /// Count an unrecognized action.
    pub fn record_unrecognized_action(&self) {
        self.unrecognized_actions.add(1, &[]);
    }
}
