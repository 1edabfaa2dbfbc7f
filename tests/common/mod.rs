//! Shared fixtures for integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use config_reconciler::prelude::*;
use config_reconciler::sources::MemoryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Registry that forwards every directive it handles to a channel.
pub struct RecordingRegistry {
    tx: mpsc::UnboundedSender<LifecycleDirective>,
    stop_all_calls: AtomicUsize,
    slow_target: Option<(String, Duration)>,
}

impl RecordingRegistry {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<LifecycleDirective>) {
        Self::build(None)
    }

    /// Directives for `target` only complete after `delay`.
    pub fn with_slow_target(
        target: &str,
        delay: Duration,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LifecycleDirective>) {
        Self::build(Some((target.to_string(), delay)))
    }

    fn build(
        slow_target: Option<(String, Duration)>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<LifecycleDirective>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                stop_all_calls: AtomicUsize::new(0),
                slow_target,
            }),
            rx,
        )
    }

    pub fn stop_all_calls(&self) -> usize {
        self.stop_all_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MonitorRegistry for RecordingRegistry {
    async fn handle(&self, directive: LifecycleDirective) {
        if let Some((target, delay)) = &self.slow_target {
            if *target == directive.target_id {
                tokio::time::sleep(*delay).await;
            }
        }
        let _ = self.tx.send(directive);
    }

    async fn stop_all(&self) {
        self.stop_all_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wait until the manager's loop has opened its watch on the store.
pub async fn wait_for_watch(store: &MemoryStore) {
    timeout(Duration::from_secs(2), async {
        while store.watcher_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop never opened its watch");
}

pub async fn next_directive(
    rx: &mut mpsc::UnboundedReceiver<LifecycleDirective>,
) -> LifecycleDirective {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for a directive")
        .expect("registry channel closed")
}

pub async fn assert_no_directive(rx: &mut mpsc::UnboundedReceiver<LifecycleDirective>) {
    let result = timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(result.is_err(), "unexpected directive: {:?}", result);
}

pub async fn wait_for_state(manager: &Manager, expected: ComponentState) {
    let mut states = manager.subscribe_state();
    timeout(Duration::from_secs(2), states.wait_for(|s| *s == expected))
        .await
        .expect("timed out waiting for state")
        .expect("state channel closed");
}
