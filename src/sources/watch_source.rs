//! Watch source traits.

use crate::core::{ScopedWatchPath, WatchEvent};
use crate::error::WatchError;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A recursive change-notification stream over one subtree.
///
/// Implementations should return [`WatchError::Canceled`] promptly once the
/// token passed to [`next`](WatchStream::next) is cancelled.
#[async_trait]
pub trait WatchStream: Send {
    /// Wait for the next notification.
    ///
    /// `Ok(None)` means the store delivered an empty notification; callers
    /// treat it as a protocol anomaly rather than the end of the stream.
    async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<WatchEvent>, WatchError>;
}

/// A distributed store that can be watched.
///
/// Implement this trait to plug in a store client (etcd, Consul, ...).
/// Opening a watch does not fail; connectivity problems surface as errors
/// from the stream itself.
pub trait WatchSource: Send + Sync {
    /// Open a recursive watch on `path`.
    fn open_recursive_watch(&self, path: &ScopedWatchPath) -> Box<dyn WatchStream>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String {
        "watch-source".to_string()
    }
}
