//! Error types for config-reconciler.

use std::fmt;

/// Result type alias for config-reconciler operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// Errors produced by a watch stream.
///
/// Cancellation is a distinct variant so it can be recognised structurally,
/// never by comparing error messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WatchError {
    /// The watch call returned because its cancellation token fired.
    #[error("context canceled")]
    Canceled,

    /// The store could not be reached or refused the watch.
    #[error("watch source unavailable: {0}")]
    Unavailable(String),

    /// The underlying stream was closed by the store.
    #[error("watch stream closed")]
    Closed,

    /// The store sent something the client could not interpret.
    #[error("watch protocol error: {0}")]
    Protocol(String),
}

/// Errors that can occur while running the reconciliation core.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ReconcileError {
    /// The watch stream returned an error.
    #[error("Unexpected watcher error: {0}")]
    Watch(#[from] WatchError),

    /// A notification carried an action tag that maps to no directive.
    #[error("Received an unrecognized action '{action}' for key '{key}'")]
    UnrecognizedAction {
        /// The raw action tag
        action: String,
        /// The key the notification fired on
        key: String,
    },

    /// Too many directives were waiting on the monitor registry.
    #[error("Dispatch backlog full ({pending} pending), dropped directive for '{target}'")]
    DispatchOverflow {
        /// Target of the refused directive
        target: String,
        /// Directives outstanding when it was refused
        pending: usize,
    },

    /// `start` was called while the loop is still running or draining.
    #[error("Reconciliation loop is already running")]
    AlreadyRunning,

    /// `start` was called outside of a tokio runtime.
    #[error("No tokio runtime available to run the reconciliation loop")]
    NoRuntime,

    /// The manager builder was missing a required collaborator.
    #[error("Failed to build manager: {0}")]
    Builder(String),

    /// Settings could not be loaded or deserialized.
    #[error("Failed to load settings: {0}")]
    Settings(String),

    /// Settings validation failed.
    #[error("Settings validation failed: {0}")]
    Validation(String),
}

/// Validation error for settings validation.
#[derive(Debug)]
pub enum ValidationError {
    /// Custom validation error with a message.
    Custom(String),

    /// A specific field has an invalid value.
    InvalidField {
        /// The field name/path
        field: String,
        /// The reason why it's invalid
        reason: String,
    },

    /// Multiple validation errors occurred.
    Multiple(Vec<ValidationError>),
}

impl ValidationError {
    /// Create a custom validation error.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an invalid field error.
    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Collapse a list of errors: `None` when empty, the error itself when
    /// there is only one.
    pub fn from_list(mut errors: Vec<ValidationError>) -> Option<Self> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Self::Multiple(errors)),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom(msg) => write!(f, "{}", msg),
            Self::InvalidField { field, reason } => {
                write!(f, "Field '{}' is invalid: {}", field, reason)
            }
            Self::Multiple(errors) => {
                writeln!(f, "Multiple validation errors:")?;
                for (i, err) in errors.iter().enumerate() {
                    writeln!(f, "  {}. {}", i + 1, err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ReconcileError {
    fn from(err: ValidationError) -> Self {
        ReconcileError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_overflow_display() {
        let err = ReconcileError::DispatchOverflow {
            target: "disk-1".into(),
            pending: 4096,
        };
        assert_eq!(
            err.to_string(),
            "Dispatch backlog full (4096 pending), dropped directive for 'disk-1'"
        );
    }

    #[test]
    fn test_watch_error_display() {
        let err = ReconcileError::from(WatchError::Unavailable("connection refused".into()));
        assert_eq!(
            err.to_string(),
            "Unexpected watcher error: watch source unavailable: connection refused"
        );
    }

    #[test]
    fn test_validation_from_list() {
        assert!(ValidationError::from_list(vec![]).is_none());

        let single = ValidationError::from_list(vec![ValidationError::custom("bad")]).unwrap();
        assert!(matches!(single, ValidationError::Custom(_)));

        let many = ValidationError::from_list(vec![
            ValidationError::custom("a"),
            ValidationError::invalid_field("member_id", "must not be empty"),
        ])
        .unwrap();
        let text = many.to_string();
        assert!(text.contains("1. a"));
        assert!(text.contains("2. Field 'member_id' is invalid: must not be empty"));
    }
}
