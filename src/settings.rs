//! Reconciler settings and their loading.
//!
//! Settings are layered the same way for every deployment: built-in defaults,
//! then an optional settings file (format detected from the extension), then
//! environment variable overrides.

use crate::core::{ScopedWatchPath, Validate};
use crate::error::{ReconcileError, Result, ValidationError};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default parent of every member's subtree in the shared store.
pub const DEFAULT_MEMBERS_PREFIX: &str = "cluster/members";

/// Default name of the config container node under a member.
pub const DEFAULT_CONFIG_DIR: &str = "config";

/// Settings for one member's reconciliation core.
///
/// # Examples
///
/// ```rust
/// use config_reconciler::settings::ReconcilerSettings;
///
/// let settings = ReconcilerSettings::new("node-1");
/// assert_eq!(settings.scope().as_str(), "cluster/members/node-1/config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReconcilerSettings {
    /// Identifier of this cluster member.
    pub member_id: String,

    /// Parent path holding all members.
    #[serde(default = "default_members_prefix")]
    pub members_prefix: String,

    /// Name of the config container node; notifications on it are ignored.
    #[serde(default = "default_config_dir")]
    pub config_dir: String,

    /// Capacity of the outbound fault channel created by [`crate::notify::fault_channel`].
    #[serde(default = "default_fault_channel_capacity")]
    pub fault_channel_capacity: usize,

    /// Upper bound on concurrently running dispatch calls.
    #[serde(default = "default_max_in_flight_dispatches")]
    pub max_in_flight_dispatches: usize,

    /// Upper bound on directives queued or running; further ones are refused
    /// and reported as faults.
    #[serde(default = "default_max_pending_dispatches")]
    pub max_pending_dispatches: usize,

    /// Also send unrecognized actions to the supervisor, not only the event log.
    #[serde(default)]
    pub escalate_unrecognized_actions: bool,
}

fn default_members_prefix() -> String {
    DEFAULT_MEMBERS_PREFIX.to_string()
}

fn default_config_dir() -> String {
    DEFAULT_CONFIG_DIR.to_string()
}

fn default_fault_channel_capacity() -> usize {
    64
}

fn default_max_in_flight_dispatches() -> usize {
    256
}

fn default_max_pending_dispatches() -> usize {
    4096
}

impl ReconcilerSettings {
    /// Create settings with defaults for everything except the member id.
    pub fn new(member_id: impl Into<String>) -> Self {
        Self {
            member_id: member_id.into(),
            members_prefix: default_members_prefix(),
            config_dir: default_config_dir(),
            fault_channel_capacity: default_fault_channel_capacity(),
            max_in_flight_dispatches: default_max_in_flight_dispatches(),
            max_pending_dispatches: default_max_pending_dispatches(),
            escalate_unrecognized_actions: false,
        }
    }

    /// Load settings from an optional file and environment overrides.
    ///
    /// # Arguments
    ///
    /// * `path` - Settings file (`.yaml`, `.yml`, `.toml` or `.json`), if any
    /// * `env_prefix` - Prefix for environment variables (e.g., "RECONCILER")
    ///
    /// Environment variables take precedence over the file:
    /// `RECONCILER_MEMBER_ID=node-1` sets `member_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, the merged result cannot be
    /// deserialized, or validation fails.
    pub fn load(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ReconcileError::Settings(format!(
                    "Settings file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder
            .build()
            .map_err(|e| ReconcileError::Settings(format!("Failed to build settings: {}", e)))?;

        let settings: Self = merged.try_deserialize().map_err(|e| {
            ReconcileError::Settings(format!("Failed to deserialize settings: {}", e))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// The path this member watches.
    pub fn scope(&self) -> ScopedWatchPath {
        ScopedWatchPath::new(&self.members_prefix, &self.member_id, &self.config_dir)
    }
}

impl Validate for ReconcilerSettings {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.member_id.trim().is_empty() {
            errors.push(ValidationError::invalid_field("member_id", "must not be empty"));
        } else if self.member_id.contains('/') {
            errors.push(ValidationError::invalid_field(
                "member_id",
                "must be a single path segment",
            ));
        }

        if self.members_prefix.trim_matches('/').is_empty() {
            errors.push(ValidationError::invalid_field(
                "members_prefix",
                "must not be empty",
            ));
        }

        if self.config_dir.is_empty() || self.config_dir.contains('/') {
            errors.push(ValidationError::invalid_field(
                "config_dir",
                "must be a single non-empty path segment",
            ));
        }

        if self.fault_channel_capacity == 0 {
            errors.push(ValidationError::invalid_field(
                "fault_channel_capacity",
                "must be greater than 0",
            ));
        }

        if self.max_in_flight_dispatches == 0 {
            errors.push(ValidationError::invalid_field(
                "max_in_flight_dispatches",
                "must be greater than 0",
            ));
        }

        if self.max_pending_dispatches < self.max_in_flight_dispatches {
            errors.push(ValidationError::invalid_field(
                "max_pending_dispatches",
                "must be at least max_in_flight_dispatches",
            ));
        }

        match ValidationError::from_list(errors) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}
