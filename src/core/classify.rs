//! Pure decision logic for watch notifications and watch errors.
//!
//! Nothing in here logs or performs I/O; the reconcile loop decides what to do
//! with each classification.

use crate::core::dispatch::{Command, LifecycleDirective};
use crate::core::event::{ScopedWatchPath, WatchAction, WatchEvent};
use crate::error::{ReconcileError, WatchError};
use tokio_util::sync::CancellationToken;

/// Why a notification was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The stream yielded no event at all.
    NilEvent,
    /// The key is empty or has no final segment.
    MalformedKey,
    /// The key lies outside the watched subtree.
    OutOfScope,
    /// The notification fired on the config container itself.
    ConfigContainer,
}

impl IgnoreReason {
    /// Protocol anomalies are dropped too, but are worth flagging in logs.
    pub fn is_anomaly(self) -> bool {
        !matches!(self, Self::ConfigContainer)
    }
}

/// Outcome of classifying a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Drop the notification.
    Ignorable(IgnoreReason),
    /// Map the notification's action to a directive.
    Actionable,
}

/// Outcome of classifying a watch error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The owning token was cancelled; end the loop.
    CleanShutdown,
    /// Anything else; report and keep watching.
    Fault,
}

/// Final path segment of a key, ignoring trailing slashes.
pub fn target_id(key: &str) -> Option<&str> {
    key.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

/// Decide whether a notification can be dropped.
pub fn classify(event: Option<&WatchEvent>, scope: &ScopedWatchPath) -> EventClass {
    let Some(event) = event else {
        return EventClass::Ignorable(IgnoreReason::NilEvent);
    };

    let Some(segment) = target_id(&event.key) else {
        return EventClass::Ignorable(IgnoreReason::MalformedKey);
    };

    if !scope.contains(&event.key) {
        return EventClass::Ignorable(IgnoreReason::OutOfScope);
    }

    if segment == scope.config_dir() {
        return EventClass::Ignorable(IgnoreReason::ConfigContainer);
    }

    EventClass::Actionable
}

/// Decide whether a watch error means the loop should stop.
///
/// Only the typed cancellation error counts, and only when the owning token has
/// actually been cancelled. A cancellation coming from somewhere else is a fault.
pub fn classify_error(err: &WatchError, token: &CancellationToken) -> ErrorClass {
    match err {
        WatchError::Canceled if token.is_cancelled() => ErrorClass::CleanShutdown,
        _ => ErrorClass::Fault,
    }
}

/// Map an actionable notification to its directive.
///
/// # Errors
///
/// Returns [`ReconcileError::UnrecognizedAction`] for any action other than
/// `set` or `delete`, and for keys without a final segment.
pub fn directive_for(event: &WatchEvent) -> Result<LifecycleDirective, ReconcileError> {
    let command = match event.action {
        WatchAction::Set => Command::Start,
        WatchAction::Delete => Command::Stop,
        WatchAction::Other(_) => {
            return Err(ReconcileError::UnrecognizedAction {
                action: event.action.to_string(),
                key: event.key.clone(),
            });
        }
    };

    let target = target_id(&event.key).ok_or_else(|| ReconcileError::UnrecognizedAction {
        action: event.action.to_string(),
        key: event.key.clone(),
    })?;

    Ok(LifecycleDirective::new(command, target, event.value.clone()))
}
