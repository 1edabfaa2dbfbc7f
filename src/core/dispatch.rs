//! Lifecycle directives and their asynchronous hand-off to the monitor registry.

use crate::error::ReconcileError;
use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error};

#[cfg(feature = "metrics")]
use crate::metrics::ReconcilerMetrics;

/// What the monitor registry should do with a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Command {
    /// Start (or reconfigure) the monitor.
    Start,
    /// Stop the monitor.
    Stop,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Stop => f.write_str("STOP"),
        }
    }
}

/// A start/stop instruction for one monitor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleDirective {
    /// Start or stop.
    pub command: Command,
    /// Last path segment of the event key.
    pub target_id: String,
    /// The event value, forwarded untouched.
    pub payload: String,
}

impl LifecycleDirective {
    /// Create a directive.
    pub fn new(command: Command, target_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            command,
            target_id: target_id.into(),
            payload: payload.into(),
        }
    }
}

/// The component that owns the actual health-check tasks.
///
/// Directives for the same target are handed over one at a time, in the order
/// the watch stream delivered them: `handle` for a target is not called again
/// until the previous call for that target has returned. Directives for
/// different targets may run concurrently and complete in any order.
/// Implementations must tolerate directives arriving after [`stop_all`].
///
/// [`stop_all`]: MonitorRegistry::stop_all
#[async_trait]
pub trait MonitorRegistry: Send + Sync {
    /// Apply a directive. The outcome is not observed by the caller.
    async fn handle(&self, directive: LifecycleDirective);

    /// Halt every running check.
    async fn stop_all(&self);
}

/// Directives accepted but not yet finished, queued per target.
///
/// A target has an entry exactly while a drain task for it is alive.
#[derive(Default)]
struct Lanes {
    queues: HashMap<String, VecDeque<LifecycleDirective>>,
    pending: usize,
}

/// Hands directives to the registry without blocking the watch loop.
///
/// Each target gets its own lane, drained by a single task, so same-target
/// directives reach the registry in stream order. A semaphore caps how many
/// registry calls run at once across all lanes, and panics raised by the
/// registry are caught and logged. At most `max_pending` directives may be
/// queued or running; beyond that [`dispatch`](Self::dispatch) refuses new
/// ones instead of letting a hung registry grow the backlog without bound.
#[derive(Clone)]
pub struct ActionDispatcher {
    registry: Arc<dyn MonitorRegistry>,
    permits: Arc<Semaphore>,
    lanes: Arc<Mutex<Lanes>>,
    max_in_flight: usize,
    max_pending: usize,
    #[cfg(feature = "metrics")]
    metrics: Option<ReconcilerMetrics>,
}

impl ActionDispatcher {
    /// Create a dispatcher allowing at most `max_in_flight` concurrent registry
    /// calls and `max_pending` accepted but unfinished directives.
    pub fn new(registry: Arc<dyn MonitorRegistry>, max_in_flight: usize, max_pending: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            registry,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            lanes: Arc::new(Mutex::new(Lanes::default())),
            max_in_flight,
            max_pending: max_pending.max(1),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Attach metrics.
    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<ReconcilerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Queue a directive on its target's lane and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::DispatchOverflow`] without queueing anything
    /// when `max_pending` directives are already outstanding.
    pub fn dispatch(&self, directive: LifecycleDirective) -> Result<(), ReconcileError> {
        let target = directive.target_id.clone();
        #[cfg(feature = "metrics")]
        let command = directive.command;

        let spawn_lane = {
            let mut lanes = self.lanes.lock();
            if lanes.pending >= self.max_pending {
                return Err(ReconcileError::DispatchOverflow {
                    target,
                    pending: lanes.pending,
                });
            }
            lanes.pending += 1;

            match lanes.queues.get_mut(&target) {
                Some(queue) => {
                    queue.push_back(directive);
                    false
                }
                None => {
                    lanes.queues.insert(target.clone(), VecDeque::from([directive]));
                    true
                }
            }
        };

        #[cfg(feature = "metrics")]
        if let Some(m) = &self.metrics {
            m.record_dispatch(command);
        }

        if spawn_lane {
            tokio::spawn(self.clone().drain(target));
        }
        Ok(())
    }

    async fn drain(self, target: String) {
        loop {
            let directive = {
                let mut lanes = self.lanes.lock();
                match lanes.queues.get_mut(&target).and_then(VecDeque::pop_front) {
                    Some(directive) => directive,
                    None => {
                        lanes.queues.remove(&target);
                        return;
                    }
                }
            };

            // The semaphore is never closed.
            let _permit = self.permits.acquire().await.ok();

            let command = directive.command;
            debug!(%command, target_id = %target, "Dispatching directive");

            let outcome = AssertUnwindSafe(self.registry.handle(directive))
                .catch_unwind()
                .await;

            if outcome.is_err() {
                error!(%command, target_id = %target, "Monitor registry panicked while handling directive");
                #[cfg(feature = "metrics")]
                if let Some(m) = &self.metrics {
                    m.record_dispatch_panic();
                }
            }

            self.lanes.lock().pending -= 1;
        }
    }

    /// Number of registry calls currently holding a permit.
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.permits.available_permits()
    }

    /// Number of directives accepted but not yet finished.
    pub fn pending(&self) -> usize {
        self.lanes.lock().pending
    }

    /// Forward a stop-all request to the registry.
    pub async fn stop_all(&self) {
        self.registry.stop_all().await;
    }
}

impl fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("max_in_flight", &self.max_in_flight)
            .field("max_pending", &self.max_pending)
            .field("in_flight", &self.in_flight())
            .field("pending", &self.pending())
            .finish()
    }
}
