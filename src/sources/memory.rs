//! In-process watchable key-value store.

use super::{WatchSource, WatchStream};
use crate::core::{ScopedWatchPath, WatchEvent};
use crate::error::WatchError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

type WatchItem = Result<Option<WatchEvent>, WatchError>;

struct StoreInner {
    data: BTreeMap<String, String>,
    watchers: Vec<(ScopedWatchPath, mpsc::UnboundedSender<WatchItem>)>,
}

impl StoreInner {
    fn publish(&mut self, event: WatchEvent) {
        self.watchers.retain(|(_, tx)| !tx.is_closed());
        for (scope, tx) in &self.watchers {
            if scope.contains(&event.key) {
                let _ = tx.send(Ok(Some(event.clone())));
            }
        }
    }

    fn broadcast(&mut self, item: WatchItem) {
        self.watchers.retain(|(_, tx)| !tx.is_closed());
        for (_, tx) in &self.watchers {
            let _ = tx.send(item.clone());
        }
    }
}

/// A watchable key-value store living in the current process.
///
/// Useful for embedding a single node, for demos, and for tests. Writes are
/// delivered to every open watch whose scope contains the key, in write order.
/// Clones share the same data and watchers.
///
/// # Examples
///
/// ```rust
/// use config_reconciler::core::ScopedWatchPath;
/// use config_reconciler::sources::{MemoryStore, WatchSource};
///
/// let store = MemoryStore::new();
/// let scope = ScopedWatchPath::for_member("node-1");
/// let _stream = store.open_recursive_watch(&scope);
///
/// store.set(scope.child("disk-1"), r#"{"path":"/"}"#);
/// assert_eq!(store.get(&scope.child("disk-1")).as_deref(), Some(r#"{"path":"/"}"#));
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                data: BTreeMap::new(),
                watchers: Vec::new(),
            })),
        }
    }

    /// Write a value and notify watchers with a `set` event.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        let mut inner = self.inner.lock();
        inner.data.insert(key.clone(), value.clone());
        inner.publish(WatchEvent::set(key, value));
    }

    /// Remove a key. Watchers see a `delete` event only if the key existed.
    ///
    /// Returns the previous value.
    pub fn delete(&self, key: &str) -> Option<String> {
        let mut inner = self.inner.lock();
        let previous = inner.data.remove(key);
        if previous.is_some() {
            inner.publish(WatchEvent::delete(key));
        }
        previous
    }

    /// Read a value.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().data.get(key).cloned()
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().data.keys().cloned().collect()
    }

    /// Deliver an arbitrary notification without touching the data.
    pub fn emit(&self, event: WatchEvent) {
        self.inner.lock().publish(event);
    }

    /// Deliver an empty notification to every watcher.
    pub fn emit_nil(&self) {
        self.inner.lock().broadcast(Ok(None));
    }

    /// Deliver an error to every watcher.
    pub fn fail(&self, error: WatchError) {
        self.inner.lock().broadcast(Err(error));
    }

    /// Number of watches still open.
    pub fn watcher_count(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.watchers.retain(|(_, tx)| !tx.is_closed());
        inner.watchers.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchSource for MemoryStore {
    fn open_recursive_watch(&self, path: &ScopedWatchPath) -> Box<dyn WatchStream> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().watchers.push((path.clone(), tx));
        Box::new(MemoryWatchStream {
            rx,
            exhausted: false,
        })
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

struct MemoryWatchStream {
    rx: mpsc::UnboundedReceiver<WatchItem>,
    exhausted: bool,
}

#[async_trait]
impl WatchStream for MemoryWatchStream {
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<WatchEvent>, WatchError> {
        if self.exhausted {
            // Closed was already reported once; only cancellation can follow.
            cancel.cancelled().await;
            return Err(WatchError::Canceled);
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(WatchError::Canceled),
            item = self.rx.recv() => match item {
                Some(item) => item,
                None => {
                    self.exhausted = true;
                    Err(WatchError::Closed)
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WatchAction;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_set_and_delete_are_delivered_in_order() {
        let store = MemoryStore::new();
        let scope = ScopedWatchPath::for_member("m1");
        let mut stream = store.open_recursive_watch(&scope);
        let token = CancellationToken::new();

        store.set(scope.child("disk-1"), "v1");
        assert_eq!(store.delete(&scope.child("disk-1")), Some("v1".to_string()));

        let first = stream.next(&token).await.unwrap().unwrap();
        assert_eq!(first.action, WatchAction::Set);
        assert_eq!(first.value, "v1");

        let second = stream.next(&token).await.unwrap().unwrap();
        assert_eq!(second.action, WatchAction::Delete);
        assert_eq!(second.key, scope.child("disk-1"));
    }

    #[tokio::test]
    async fn test_delete_of_missing_key_is_silent() {
        let store = MemoryStore::new();
        let scope = ScopedWatchPath::for_member("m1");
        let mut stream = store.open_recursive_watch(&scope);
        let token = CancellationToken::new();

        assert_eq!(store.delete(&scope.child("nope")), None);
        let result = timeout(Duration::from_millis(50), stream.next(&token)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_watch_is_scoped() {
        let store = MemoryStore::new();
        let mine = ScopedWatchPath::for_member("m1");
        let theirs = ScopedWatchPath::for_member("m2");
        let mut stream = store.open_recursive_watch(&mine);
        let token = CancellationToken::new();

        store.set(theirs.child("cpu"), "x");
        store.set(mine.child("cpu"), "y");

        let event = stream.next(&token).await.unwrap().unwrap();
        assert_eq!(event.key, mine.child("cpu"));
        assert_eq!(store.keys().len(), 2);
    }

    #[tokio::test]
    async fn test_nil_and_error_broadcast() {
        let store = MemoryStore::new();
        let mut stream = store.open_recursive_watch(&ScopedWatchPath::for_member("m1"));
        let token = CancellationToken::new();

        store.emit_nil();
        store.fail(WatchError::Unavailable("down".into()));

        assert_eq!(stream.next(&token).await, Ok(None));
        assert_eq!(
            stream.next(&token).await,
            Err(WatchError::Unavailable("down".into()))
        );
    }

    #[tokio::test]
    async fn test_cancel_interrupts_next() {
        let store = MemoryStore::new();
        let mut stream = store.open_recursive_watch(&ScopedWatchPath::for_member("m1"));
        let token = CancellationToken::new();

        let cancel = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        assert_eq!(stream.next(&token).await, Err(WatchError::Canceled));
    }

    #[tokio::test]
    async fn test_closed_reported_once() {
        let store = MemoryStore::new();
        let mut stream = store.open_recursive_watch(&ScopedWatchPath::for_member("m1"));
        let token = CancellationToken::new();
        drop(store);

        assert_eq!(stream.next(&token).await, Err(WatchError::Closed));

        let pending = timeout(Duration::from_millis(50), stream.next(&token)).await;
        assert!(pending.is_err());

        token.cancel();
        assert_eq!(stream.next(&token).await, Err(WatchError::Canceled));
    }

    #[test]
    fn test_dropped_streams_are_pruned() {
        let store = MemoryStore::new();
        let stream = store.open_recursive_watch(&ScopedWatchPath::for_member("m1"));
        assert_eq!(store.watcher_count(), 1);
        drop(stream);
        assert_eq!(store.watcher_count(), 0);
    }
}
