//! The watch-reconcile loop.

use crate::core::classify::{self, ErrorClass, EventClass};
use crate::core::dispatch::ActionDispatcher;
use crate::core::event::{ScopedWatchPath, WatchEvent};
use crate::error::WatchError;
use crate::notify::{EscalationReporter, FaultKind};
use crate::sources::WatchSource;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(feature = "metrics")]
use crate::metrics::ReconcilerMetrics;

/// Operation name used in fault sources (`manager.run`).
const RUN_OPERATION: &str = "run";

/// Counters describing one run of the loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Notifications received, including nil ones.
    pub events: u64,
    /// Notifications dropped by the classifier.
    pub ignored: u64,
    /// Directives handed to the dispatcher.
    pub dispatched: u64,
    /// Stream errors and refused directives escalated as faults.
    pub faults: u64,
    /// Notifications with an unrecognized action.
    pub unrecognized: u64,
}

/// One long-lived watch over a member's config subtree.
///
/// The loop never re-subscribes and never stops on a fault; it only returns
/// once `token` is cancelled.
pub(crate) struct ReconcileLoop {
    pub(crate) scope: ScopedWatchPath,
    pub(crate) source: Arc<dyn WatchSource>,
    pub(crate) dispatcher: ActionDispatcher,
    pub(crate) reporter: EscalationReporter,
    pub(crate) token: CancellationToken,
    #[cfg(feature = "metrics")]
    pub(crate) metrics: Option<ReconcilerMetrics>,
}

impl ReconcileLoop {
    pub(crate) async fn run(self) -> LoopStats {
        let mut stream = self.source.open_recursive_watch(&self.scope);
        let mut stats = LoopStats::default();

        info!(scope = %self.scope, source = %self.source.name(), "Watching member config");

        loop {
            // Checked first so a source that ignores the token still cannot
            // keep the loop alive past cancellation.
            let next = tokio::select! {
                biased;
                _ = self.token.cancelled() => Err(WatchError::Canceled),
                next = stream.next(&self.token) => next,
            };

            let event = match next {
                Ok(event) => event,
                Err(err) => match classify::classify_error(&err, &self.token) {
                    ErrorClass::CleanShutdown => {
                        debug!("Received a notice to shutdown");
                        break;
                    }
                    ErrorClass::Fault => {
                        stats.faults += 1;
                        // Overwatch decides whether to shut us down.
                        self.reporter
                            .report(err.into(), RUN_OPERATION, FaultKind::WatchStreamError);
                        tokio::task::yield_now().await;
                        continue;
                    }
                },
            };

            stats.events += 1;
            #[cfg(feature = "metrics")]
            if let Some(m) = &self.metrics {
                m.record_event_received();
            }

            self.handle_event(event, &mut stats);
        }

        debug!(
            events = stats.events,
            dispatched = stats.dispatched,
            ignored = stats.ignored,
            faults = stats.faults,
            "Exiting..."
        );
        stats
    }

    fn handle_event(&self, event: Option<WatchEvent>, stats: &mut LoopStats) {
        let class = classify::classify(event.as_ref(), &self.scope);

        let event = match (class, event) {
            (EventClass::Actionable, Some(event)) => event,
            (class, event) => {
                stats.ignored += 1;
                let reason = match class {
                    EventClass::Ignorable(reason) => reason,
                    EventClass::Actionable => classify::IgnoreReason::NilEvent,
                };

                #[cfg(feature = "metrics")]
                if let Some(m) = &self.metrics {
                    m.record_event_ignored(reason);
                }

                match event {
                    Some(event) if reason.is_anomaly() => debug!(
                        ?reason,
                        action = %event.action,
                        key = %event.key,
                        "Received a malformed watcher event"
                    ),
                    Some(event) => debug!(
                        action = %event.action,
                        key = %event.key,
                        "Received an ignorable watcher event"
                    ),
                    None => debug!("Received a nil watcher event - bug?"),
                }
                return;
            }
        };

        debug!(
            action = %event.action,
            key = %event.key,
            value = %event.value,
            "Received watcher event"
        );

        match classify::directive_for(&event) {
            Ok(directive) => match self.dispatcher.dispatch(directive) {
                Ok(()) => stats.dispatched += 1,
                Err(err) => {
                    stats.faults += 1;
                    self.reporter
                        .report(err, RUN_OPERATION, FaultKind::DispatchOverflow);
                }
            },
            Err(err) => {
                stats.unrecognized += 1;
                self.reporter.record_unrecognized_action(err, RUN_OPERATION);
            }
        }
    }
}
