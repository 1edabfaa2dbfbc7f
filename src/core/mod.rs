//! Core reconciliation types: classification, dispatch, and the lifecycle controller.

mod builder;
pub mod classify;
mod dispatch;
mod event;
mod manager;
mod reconcile;
mod validation;

pub use builder::ManagerBuilder;
pub use classify::{ErrorClass, EventClass, IgnoreReason};
pub use dispatch::{ActionDispatcher, Command, LifecycleDirective, MonitorRegistry};
pub use event::{ScopedWatchPath, WatchAction, WatchEvent};
pub use manager::{ComponentState, Manager};
pub use reconcile::LoopStats;
pub use validation::Validate;
