//! # Recovery actions and their outcomes.
//!
//! Every [`RecoveryAction`] starts `Pending` and reaches exactly one terminal
//! [`Outcome`]; the orchestrator never drops an action without one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Corrective measure the orchestrator can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Ask the subsystem to restart itself.
    Restart,
    /// Take the subsystem out of service until an operator acknowledges it.
    Isolate,
    /// Ask the subsystem to shed input load.
    ThrottleInput,
    /// Hand the problem to a human via the alert sink.
    Escalate,
}

impl ActionKind {
    /// Short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Restart => "restart",
            ActionKind::Isolate => "isolate",
            ActionKind::ThrottleInput => "throttle_input",
            ActionKind::Escalate => "escalate",
        }
    }

    /// True for kinds delivered as control envelopes on the bus.
    pub fn is_control(&self) -> bool {
        !matches!(self, ActionKind::Escalate)
    }
}

/// Lifecycle result of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Issued, awaiting completion evidence.
    Pending,
    /// Completed as intended.
    Succeeded,
    /// Timed out, undeliverable, or superseded.
    Failed,
}

impl Outcome {
    /// True once the action can no longer change.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Pending)
    }
}

/// One action taken against one subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryAction {
    /// Monotonic id, unique per orchestrator.
    pub id: u64,
    /// Target subsystem.
    pub target: Arc<str>,
    /// What was done.
    pub kind: ActionKind,
    /// When it was issued.
    pub issued_at: Instant,
    /// Current outcome.
    pub outcome: Outcome,
    /// Why it was issued.
    pub reason: Arc<str>,
    /// When it reached its terminal outcome.
    pub completed_at: Option<Instant>,
    /// Why it ended the way it did (terminal outcomes only).
    pub detail: Option<Arc<str>>,
}

impl RecoveryAction {
    pub(crate) fn new(
        id: u64,
        target: Arc<str>,
        kind: ActionKind,
        reason: impl Into<Arc<str>>,
        now: Instant,
    ) -> Self {
        Self {
            id,
            target,
            kind,
            issued_at: now,
            outcome: Outcome::Pending,
            reason: reason.into(),
            completed_at: None,
            detail: None,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        self.outcome == Outcome::Pending
    }

    /// Moves a pending action to `outcome`; returns false if it already ended.
    pub(crate) fn complete(
        &mut self,
        outcome: Outcome,
        detail: impl Into<Arc<str>>,
        now: Instant,
    ) -> bool {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return false;
        }
        self.outcome = outcome;
        self.detail = Some(detail.into());
        self.completed_at = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_happens_once() {
        let now = Instant::now();
        let mut a = RecoveryAction::new(1, Arc::from("motor-1"), ActionKind::Restart, "silent", now);
        assert!(a.is_pending());
        assert!(a.complete(Outcome::Succeeded, "healthy again", now));
        assert!(!a.complete(Outcome::Failed, "late timeout", now));
        assert_eq!(a.outcome, Outcome::Succeeded);
        assert_eq!(a.detail.as_deref(), Some("healthy again"));
    }

    #[test]
    fn only_escalation_skips_the_bus() {
        assert!(ActionKind::Restart.is_control());
        assert!(ActionKind::ThrottleInput.is_control());
        assert!(!ActionKind::Escalate.is_control());
    }
}
