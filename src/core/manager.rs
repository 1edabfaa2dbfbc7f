//! Lifecycle controller for a member's reconciliation loop.

use crate::core::builder::ManagerBuilder;
use crate::core::dispatch::ActionDispatcher;
use crate::core::event::ScopedWatchPath;
use crate::core::reconcile::ReconcileLoop;
use crate::error::{ReconcileError, Result};
use crate::notify::EscalationReporter;
use crate::settings::ReconcilerSettings;
use crate::sources::WatchSource;
use futures::FutureExt;
use parking_lot::Mutex;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(feature = "metrics")]
use crate::metrics::ReconcilerMetrics;

/// Identifier used as the component part of fault sources.
pub(crate) const COMPONENT: &str = "manager";

/// Lifecycle of the reconciliation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentState {
    /// Built, never started.
    Created,
    /// The loop is watching and dispatching.
    Running,
    /// Stop was requested; the loop has not observed it yet.
    Stopping,
    /// The loop has returned.
    Stopped,
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Owns a member's watch-reconcile loop and its cancellation token.
///
/// # Examples
///
/// ```rust,no_run
/// use config_reconciler::prelude::*;
/// use config_reconciler::sources::MemoryStore;
/// use std::sync::Arc;
///
/// # async fn example(registry: Arc<dyn MonitorRegistry>) -> Result<()> {
/// let store = MemoryStore::new();
/// let (faults, mut supervisor) = fault_channel(64);
///
/// let manager = Manager::builder()
///     .with_settings(ReconcilerSettings::new("node-1"))
///     .with_watch_source(store.clone())
///     .with_registry(registry)
///     .with_fault_sender(faults)
///     .build()?;
///
/// manager.start()?;
/// store.set("cluster/members/node-1/config/disk-1", r#"{"path":"/"}"#);
///
/// // Later, on shutdown
/// manager.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Manager {
    settings: ReconcilerSettings,
    scope: ScopedWatchPath,
    source: Arc<dyn WatchSource>,
    dispatcher: ActionDispatcher,
    reporter: EscalationReporter,
    parent: Option<CancellationToken>,
    token: Mutex<Option<CancellationToken>>,
    state: Arc<watch::Sender<ComponentState>>,
    #[cfg(feature = "metrics")]
    metrics: Option<ReconcilerMetrics>,
}

impl Manager {
    /// Create a new builder for constructing a manager.
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        settings: ReconcilerSettings,
        source: Arc<dyn WatchSource>,
        dispatcher: ActionDispatcher,
        reporter: EscalationReporter,
        parent: Option<CancellationToken>,
    ) -> Self {
        let (state, _) = watch::channel(ComponentState::Created);
        Self {
            scope: settings.scope(),
            settings,
            source,
            dispatcher,
            reporter,
            parent,
            token: Mutex::new(None),
            state: Arc::new(state),
            #[cfg(feature = "metrics")]
            metrics: None,
        }
    }

    #[cfg(feature = "metrics")]
    pub(crate) fn with_metrics(mut self, metrics: Option<ReconcilerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Start the watch loop and return immediately.
    ///
    /// Allocates a fresh cancellation token (a child of the parent token, if one
    /// was configured) and spawns the loop on the current tokio runtime. The
    /// loop may not have opened its watch yet when this returns. A stopped
    /// manager can be started again.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop is still running or draining, or if called
    /// outside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| ReconcileError::NoRuntime)?;

        let mut slot = self.token.lock();
        let current = *self.state.borrow();
        if matches!(current, ComponentState::Running | ComponentState::Stopping) {
            return Err(ReconcileError::AlreadyRunning);
        }

        info!(member_id = %self.settings.member_id, "Starting manager components...");

        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        *slot = Some(token.clone());
        self.state.send_replace(ComponentState::Running);

        let reconcile = ReconcileLoop {
            scope: self.scope.clone(),
            source: Arc::clone(&self.source),
            dispatcher: self.dispatcher.clone(),
            reporter: self.reporter.clone(),
            token,
            #[cfg(feature = "metrics")]
            metrics: self.metrics.clone(),
        };
        let state = Arc::clone(&self.state);

        runtime.spawn(async move {
            if AssertUnwindSafe(reconcile.run()).catch_unwind().await.is_err() {
                error!("Reconciliation loop panicked");
            }
            state.send_replace(ComponentState::Stopped);
        });

        Ok(())
    }

    /// Request shutdown and halt all running checks.
    ///
    /// Cancels the loop's token and asks the registry to stop every check. Does
    /// not wait for the loop to exit; watch [`subscribe_state`](Self::subscribe_state)
    /// for that. Stopping a manager that was never started only logs a warning.
    pub async fn stop(&self) -> Result<()> {
        let token = {
            let slot = self.token.lock();
            match slot.as_ref() {
                Some(token) => token.clone(),
                None => {
                    warn!(
                        member_id = %self.settings.member_id,
                        "Looks like the cancellation token is unset; is this expected?"
                    );
                    return Ok(());
                }
            }
        };

        // Move to Stopping before cancelling so the loop's Stopped always wins.
        self.state.send_if_modified(|state| {
            if *state == ComponentState::Running {
                *state = ComponentState::Stopping;
                true
            } else {
                false
            }
        });
        token.cancel();

        self.dispatcher.stop_all().await;
        debug!(member_id = %self.settings.member_id, "Requested stop of all checks");

        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ComponentState {
        *self.state.borrow()
    }

    /// Observe lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ComponentState> {
        self.state.subscribe()
    }

    /// This member's identifier.
    pub fn member_id(&self) -> &str {
        &self.settings.member_id
    }

    /// The watched subtree.
    pub fn scope(&self) -> &ScopedWatchPath {
        &self.scope
    }

    /// The settings this manager was built with.
    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    /// Fault reports dropped because the supervisor channel was full or closed.
    pub fn dropped_reports(&self) -> u64 {
        self.reporter.dropped_reports()
    }

    /// Registry calls currently running.
    pub fn in_flight_dispatches(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Directives accepted but not yet handled by the registry.
    pub fn pending_dispatches(&self) -> usize {
        self.dispatcher.pending()
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("member_id", &self.settings.member_id)
            .field("scope", &self.scope.as_str())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatch::{LifecycleDirective, MonitorRegistry};
    use crate::notify::fault_channel;
    use crate::sources::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingRegistry {
        stop_all_calls: AtomicUsize,
    }

    #[async_trait]
    impl MonitorRegistry for CountingRegistry {
        async fn handle(&self, _directive: LifecycleDirective) {}

        async fn stop_all(&self) {
            self.stop_all_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn manager(registry: Arc<CountingRegistry>) -> Manager {
        let (faults, _rx) = fault_channel(4);
        Manager::builder()
            .with_settings(ReconcilerSettings::new("m1"))
            .with_watch_source(MemoryStore::new())
            .with_registry(registry)
            .with_fault_sender(faults)
            .build()
            .unwrap()
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ComponentState::Stopping.to_string(), "stopping");
    }

    #[test]
    fn test_start_requires_runtime() {
        let manager = manager(Arc::new(CountingRegistry::default()));
        assert!(matches!(manager.start(), Err(ReconcileError::NoRuntime)));
        assert_eq!(manager.state(), ComponentState::Created);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_noop() {
        let registry = Arc::new(CountingRegistry::default());
        let manager = manager(registry.clone());

        assert!(manager.stop().await.is_ok());
        assert_eq!(manager.state(), ComponentState::Created);
        assert_eq!(registry.stop_all_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_double_start_is_rejected() {
        let manager = manager(Arc::new(CountingRegistry::default()));
        manager.start().unwrap();
        assert!(matches!(manager.start(), Err(ReconcileError::AlreadyRunning)));
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_transitions_to_stopped() {
        let registry = Arc::new(CountingRegistry::default());
        let manager = manager(registry.clone());
        let mut states = manager.subscribe_state();

        manager.start().unwrap();
        assert_eq!(manager.state(), ComponentState::Running);

        manager.stop().await.unwrap();
        assert_eq!(registry.stop_all_calls.load(Ordering::SeqCst), 1);

        states
            .wait_for(|s| *s == ComponentState::Stopped)
            .await
            .unwrap();
    }
}
