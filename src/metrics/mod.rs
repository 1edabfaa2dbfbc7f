//! Built-in metrics for the reconciliation core.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Watch notifications received and ignored
//! - Directives dispatched, per command
//! - Fault reports sent and dropped
//! - Unrecognized actions and registry panics
//!
//! # Examples
//!
//! ```rust,no_run
//! use config_reconciler::prelude::*;
//! use config_reconciler::sources::MemoryStore;
//! use opentelemetry::global;
//! use std::sync::Arc;
//!
//! # fn example(registry: Arc<dyn MonitorRegistry>) -> Result<()> {
//! let (faults, _supervisor) = fault_channel(64);
//! let manager = Manager::builder()
//!     .with_settings(ReconcilerSettings::new("node-1"))
//!     .with_watch_source(MemoryStore::new())
//!     .with_registry(registry)
//!     .with_fault_sender(faults)
//!     .with_metrics(global::meter("reconciler"))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod reconciler_metrics;

pub use reconciler_metrics::ReconcilerMetrics;
