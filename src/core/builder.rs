//! Builder for constructing Manager instances.

use crate::core::Validate;
use crate::core::dispatch::{ActionDispatcher, MonitorRegistry};
use crate::core::manager::{COMPONENT, Manager};
use crate::error::{ReconcileError, Result};
use crate::notify::{EscalationReporter, EventLog, FaultReport, TracingEventLog};
use crate::settings::ReconcilerSettings;
use crate::sources::WatchSource;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[cfg(feature = "metrics")]
use crate::metrics::ReconcilerMetrics;

/// Builder for constructing a [`Manager`].
///
/// Every collaborator is passed in explicitly; there is no global logger or
/// configuration.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reconciler::prelude::*;
/// use config_reconciler::notify::BufferedEventLog;
/// use config_reconciler::sources::MemoryStore;
/// use std::sync::Arc;
///
/// # fn example(registry: Arc<dyn MonitorRegistry>) -> Result<()> {
/// let settings = ReconcilerSettings::new("node-1");
/// let (faults, _supervisor) = fault_channel(settings.fault_channel_capacity);
///
/// let manager = Manager::builder()
///     .with_settings(settings)
///     .with_watch_source(MemoryStore::new())
///     .with_registry(registry)
///     .with_event_log(Arc::new(BufferedEventLog::new(256)))
///     .with_fault_sender(faults)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ManagerBuilder {
    settings: Option<ReconcilerSettings>,
    source: Option<Arc<dyn WatchSource>>,
    registry: Option<Arc<dyn MonitorRegistry>>,
    event_log: Option<Arc<dyn EventLog>>,
    fault_sender: Option<mpsc::Sender<FaultReport>>,
    parent_token: Option<CancellationToken>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReconcilerMetrics>,
}

impl ManagerBuilder {
    /// Create a new builder with nothing configured.
    pub fn new() -> Self {
        Self {
            settings: None,
            source: None,
            registry: None,
            event_log: None,
            fault_sender: None,
            parent_token: None,
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    /// Set the member settings. Required.
    pub fn with_settings(mut self, settings: ReconcilerSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Set the store to watch. Required.
    pub fn with_watch_source<S: WatchSource + 'static>(mut self, source: S) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Set an already shared store to watch.
    pub fn with_shared_watch_source(mut self, source: Arc<dyn WatchSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the monitor registry directives are sent to. Required.
    pub fn with_registry(mut self, registry: Arc<dyn MonitorRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the error log. Defaults to [`TracingEventLog`].
    pub fn with_event_log(mut self, event_log: Arc<dyn EventLog>) -> Self {
        self.event_log = Some(event_log);
        self
    }

    /// Set the channel fault reports are sent on. Required.
    ///
    /// See [`fault_channel`](crate::notify::fault_channel).
    pub fn with_fault_sender(mut self, sender: mpsc::Sender<FaultReport>) -> Self {
        self.fault_sender = Some(sender);
        self
    }

    /// Derive each run's token from `token`, so cancelling it (e.g., from a
    /// supervisor) also ends the loop.
    pub fn with_parent_token(mut self, token: CancellationToken) -> Self {
        self.parent_token = Some(token);
        self
    }

    /// Record metrics with the given meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(ReconcilerMetrics::new(meter));
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Settings, watch source, registry or fault sender are missing
    /// - Settings validation fails
    pub fn build(self) -> Result<Manager> {
        let settings = self
            .settings
            .ok_or_else(|| ReconcileError::Builder("settings are required".to_string()))?;
        settings.validate()?;

        let source = self
            .source
            .ok_or_else(|| ReconcileError::Builder("a watch source is required".to_string()))?;
        let registry = self
            .registry
            .ok_or_else(|| ReconcileError::Builder("a monitor registry is required".to_string()))?;
        let fault_sender = self
            .fault_sender
            .ok_or_else(|| ReconcileError::Builder("a fault sender is required".to_string()))?;
        let event_log = self
            .event_log
            .unwrap_or_else(|| Arc::new(TracingEventLog));

        let dispatcher = ActionDispatcher::new(
            registry,
            settings.max_in_flight_dispatches,
            settings.max_pending_dispatches,
        );
        let reporter = EscalationReporter::new(COMPONENT, event_log, fault_sender)
            .with_unrecognized_escalation(settings.escalate_unrecognized_actions);

        #[cfg(feature = "metrics")]
        let dispatcher = dispatcher.with_metrics(self.metrics.clone());
        #[cfg(feature = "metrics")]
        let reporter = reporter.with_metrics(self.metrics.clone());

        let manager =
            Manager::from_parts(settings, source, dispatcher, reporter, self.parent_token);

        #[cfg(feature = "metrics")]
        let manager = manager.with_metrics(self.metrics);

        Ok(manager)
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::LifecycleDirective;
    use crate::notify::fault_channel;
    use crate::sources::MemoryStore;
    use async_trait::async_trait;

    struct NullRegistry;

    #[async_trait]
    impl MonitorRegistry for NullRegistry {
        async fn handle(&self, _directive: LifecycleDirective) {}
        async fn stop_all(&self) {}
    }

    #[test]
    fn test_build_complete() {
        let (faults, _rx) = fault_channel(4);
        let manager = ManagerBuilder::new()
            .with_settings(ReconcilerSettings::new("m1"))
            .with_watch_source(MemoryStore::new())
            .with_registry(Arc::new(NullRegistry))
            .with_fault_sender(faults)
            .build()
            .unwrap();

        assert_eq!(manager.member_id(), "m1");
        assert_eq!(manager.scope().as_str(), "cluster/members/m1/config");
    }

    #[test]
    fn test_build_requires_settings() {
        let result = ManagerBuilder::new().build();
        assert!(matches!(result, Err(ReconcileError::Builder(_))));
    }

    #[test]
    fn test_build_requires_source() {
        let (faults, _rx) = fault_channel(4);
        let result = ManagerBuilder::new()
            .with_settings(ReconcilerSettings::new("m1"))
            .with_registry(Arc::new(NullRegistry))
            .with_fault_sender(faults)
            .build();
        assert!(matches!(result, Err(ReconcileError::Builder(msg)) if msg.contains("watch source")));
    }

    #[test]
    fn test_build_validates_settings() {
        let (faults, _rx) = fault_channel(4);
        let result = ManagerBuilder::new()
            .with_settings(ReconcilerSettings::new("bad/id"))
            .with_watch_source(MemoryStore::new())
            .with_registry(Arc::new(NullRegistry))
            .with_fault_sender(faults)
            .build();
        assert!(matches!(result, Err(ReconcileError::Validation(_))));
    }
}
