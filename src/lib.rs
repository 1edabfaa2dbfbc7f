//! # config-reconciler
//!
//! Watch-to-dispatch reconciliation core for a cluster member of a
//! config-driven monitoring agent.
//!
//! ## Overview
//!
//! Each member watches its own subtree of a shared, strongly-consistent
//! key-value store (`cluster/members/<member-id>/config`, recursively) and turns
//! every change into a lifecycle directive for the local monitor registry:
//! - `set` on `.../config/<monitor-id>` starts (or reconfigures) that monitor
//! - `delete` on `.../config/<monitor-id>` stops it
//! - notifications on the `config` node itself, nil notifications and keys
//!   outside the subtree are dropped
//!
//! Watch errors never stop the loop. They are written to the error log and sent
//! to a supervising component over a bounded channel; the supervisor decides
//! whether to restart or cancel the member.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use config_reconciler::prelude::*;
//! use config_reconciler::sources::MemoryStore;
//! use std::sync::Arc;
//!
//! struct Checks;
//!
//! #[async_trait]
//! impl MonitorRegistry for Checks {
//!     async fn handle(&self, directive: LifecycleDirective) {
//!         println!("{} {}", directive.command, directive.target_id);
//!     }
//!
//!     async fn stop_all(&self) {}
//! }
//!
//! # async fn example() -> Result<()> {
//! let store = MemoryStore::new();
//! let settings = ReconcilerSettings::new("node-1");
//! let (faults, mut supervisor) = fault_channel(settings.fault_channel_capacity);
//!
//! let manager = Manager::builder()
//!     .with_settings(settings)
//!     .with_watch_source(store.clone())
//!     .with_registry(Arc::new(Checks))
//!     .with_fault_sender(faults)
//!     .build()?;
//!
//! manager.start()?;
//! store.set("cluster/members/node-1/config/disk-1", r#"{"path":"/"}"#);
//!
//! // The supervisor owns the remedy for faults
//! tokio::spawn(async move {
//!     while let Some(report) = supervisor.recv().await {
//!         eprintln!("{} from {}: {}", report.kind, report.source, report.error);
//!     }
//! });
//!
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `yaml`, `toml`, `json` (default): settings file formats
//! - `metrics`: OpenTelemetry counters for events, directives and faults

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod notify;
pub mod settings;
pub mod sources;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{
        Command, ComponentState, LifecycleDirective, Manager, ManagerBuilder, MonitorRegistry,
        ScopedWatchPath, WatchAction, WatchEvent,
    };
    pub use crate::error::{ReconcileError, Result, WatchError};
    pub use crate::notify::{FaultKind, FaultReport, fault_channel};
    pub use crate::settings::ReconcilerSettings;
    pub use crate::sources::{WatchSource, WatchStream};
}
