//! Outbound notifications: the error log and fault reports to the supervisor.

pub mod escalation;
pub mod event_log;

pub use escalation::{EscalationReporter, FaultKind, FaultReport, fault_channel};
pub use event_log::{BufferedEventLog, EventLog, Fields, LoggedError, TracingEventLog};
