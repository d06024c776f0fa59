//! Recovery: actions, restart budgets, escalation and the orchestrator.
//!
//! - [`RecoveryAction`], [`ActionKind`], [`Outcome`] action records
//! - [`RestartBudget`] rolling-window restart limit
//! - [`RecoveryMachine`], [`Effect`] synchronous decision core
//! - [`Orchestrator`] async executor (control envelopes, timers, alerts)
//! - [`AlertSink`], [`AlertLog`], [`Alert`], [`Severity`] escalation seam

mod action;
mod alert;
mod budget;
mod machine;
mod orchestrator;

pub use action::{ActionKind, Outcome, RecoveryAction};
pub use alert::{Alert, AlertLog, AlertSink, Severity};
pub use budget::RestartBudget;
pub use machine::{Effect, RecoveryMachine, RecoveryPolicy, RecoveryStatus};
pub use orchestrator::{ORCHESTRATOR_ID, Orchestrator};
