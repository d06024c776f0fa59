//! # Health classifier: the synchronous core of the anomaly detector.
//!
//! [`HealthClassifier`] holds the decided state of every subsystem and turns
//! snapshots into [`Transition`]s. It never reads a clock; callers pass `now`.
//!
//! ## State machine
//! ```text
//!            raw rule result (each evaluation)
//!   Healthy ◄──────────► Degraded ◄──────────► Unresponsive
//!      ▲                                            │
//!      │ healthy for confirmation_window            │ Restart issued
//!      │                                            ▼
//!      └───────────────────────────────────── Recovering
//!                                                   │ recovery_timeout
//!                        Isolate issued             ▼
//!   (any) ─────────────────────────────────────► Failed ──(acknowledge)──► Healthy
//! ```
//!
//! Recovering ignores the raw state except for the confirmation window: any
//! non-healthy evaluation restarts the window. Failed ignores everything
//! until acknowledged.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::MonitorConfig;
use crate::events::{EventKind, MonitorEvent};
use crate::recovery::ActionKind;
use crate::telemetry::SubsystemRecord;

use super::health::HealthState;
use super::rules::{Thresholds, classify};

/// One decided state change.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub subsystem: Arc<str>,
    pub from: HealthState,
    pub to: HealthState,
    pub reason: String,
}

impl Transition {
    /// Converts into a `StateChanged` event.
    pub fn into_event(self) -> MonitorEvent {
        MonitorEvent::new(EventKind::StateChanged)
            .with_subsystem(self.subsystem)
            .with_transition(self.from, self.to)
            .with_reason(self.reason)
    }
}

#[derive(Debug, Clone, Copy)]
struct Tracked {
    state: HealthState,
    entered: Instant,
    healthy_since: Option<Instant>,
}

impl Tracked {
    fn new(now: Instant) -> Self {
        Self {
            state: HealthState::Healthy,
            entered: now,
            healthy_since: None,
        }
    }
}

/// Decides subsystem health from telemetry snapshots.
#[derive(Debug)]
pub struct HealthClassifier {
    thresholds: Thresholds,
    confirmation_window: Duration,
    recovery_timeout: Duration,
    tracked: HashMap<Arc<str>, Tracked>,
}

impl HealthClassifier {
    pub fn new(cfg: &MonitorConfig) -> Self {
        Self {
            thresholds: Thresholds::from(cfg),
            confirmation_window: cfg.confirmation_window,
            recovery_timeout: cfg.recovery_timeout,
            tracked: HashMap::new(),
        }
    }

    /// Decided state of a subsystem, if it was ever evaluated.
    pub fn state(&self, id: &str) -> Option<HealthState> {
        self.tracked.get(id).map(|t| t.state)
    }

    /// One evaluation pass over `snapshots` at `now`.
    pub fn evaluate(&mut self, snapshots: &[SubsystemRecord], now: Instant) -> Vec<Transition> {
        let mut out = Vec::new();
        for record in snapshots {
            let verdict = classify(record, now, &self.thresholds);
            let tracked = self
                .tracked
                .entry(Arc::clone(&record.id))
                .or_insert_with(|| Tracked::new(now));

            let next = match tracked.state {
                HealthState::Failed => None,
                HealthState::Recovering => {
                    recovering_step(tracked, verdict.state, now, self.confirmation_window, self.recovery_timeout)
                }
                current if current != verdict.state => Some((verdict.state, verdict.reason)),
                _ => None,
            };

            if let Some((to, reason)) = next {
                out.push(move_to(tracked, &record.id, to, reason, now));
            }
        }
        out
    }

    /// Reacts to an action announced by the orchestrator.
    ///
    /// `Restart` moves the subsystem to `Recovering`; `Isolate` to `Failed`.
    pub fn on_action_issued(&mut self, id: &str, kind: ActionKind, now: Instant) -> Option<Transition> {
        let tracked = self
            .tracked
            .entry(Arc::from(id))
            .or_insert_with(|| Tracked::new(now));
        let (to, reason) = match kind {
            ActionKind::Restart if tracked.state != HealthState::Failed => {
                (HealthState::Recovering, "restart issued")
            }
            ActionKind::Isolate => (HealthState::Failed, "isolated"),
            _ => return None,
        };
        if tracked.state == to {
            return None;
        }
        let id: Arc<str> = Arc::from(id);
        Some(move_to(tracked, &id, to, reason.to_string(), now))
    }

    /// Aligns a subsystem with the recovery side after missed announcements.
    ///
    /// An isolated subsystem is `Failed`; one with a pending Restart is
    /// `Recovering` unless already `Failed`.
    pub fn reconcile(
        &mut self,
        id: &str,
        restart_pending: bool,
        isolated: bool,
        now: Instant,
    ) -> Option<Transition> {
        let current = self.state(id);
        if isolated && current != Some(HealthState::Failed) {
            return self.on_action_issued(id, ActionKind::Isolate, now);
        }
        let settled = matches!(current, Some(HealthState::Recovering | HealthState::Failed));
        if restart_pending && !settled {
            return self.on_action_issued(id, ActionKind::Restart, now);
        }
        None
    }

    /// Returns a `Failed` subsystem to evaluation.
    pub fn acknowledge(&mut self, id: &str, now: Instant) -> Option<Transition> {
        let tracked = self.tracked.get_mut(id)?;
        if tracked.state != HealthState::Failed {
            return None;
        }
        let id: Arc<str> = Arc::from(id);
        Some(move_to(
            tracked,
            &id,
            HealthState::Healthy,
            "acknowledged by operator".to_string(),
            now,
        ))
    }
}

fn recovering_step(
    tracked: &mut Tracked,
    raw: HealthState,
    now: Instant,
    confirmation: Duration,
    timeout: Duration,
) -> Option<(HealthState, String)> {
    let elapsed = now.saturating_duration_since(tracked.entered);
    if elapsed >= timeout {
        return Some((
            HealthState::Failed,
            format!("recovery not confirmed within {timeout:?}"),
        ));
    }
    if raw != HealthState::Healthy {
        tracked.healthy_since = None;
        return None;
    }
    let since = *tracked.healthy_since.get_or_insert(now);
    let healthy_for = now.saturating_duration_since(since);
    (healthy_for >= confirmation).then(|| {
        (
            HealthState::Healthy,
            format!("recovery confirmed after {healthy_for:?} healthy"),
        )
    })
}

fn move_to(tracked: &mut Tracked, id: &Arc<str>, to: HealthState, reason: String, now: Instant) -> Transition {
    let from = tracked.state;
    tracked.state = to;
    tracked.entered = now;
    tracked.healthy_since = None;
    Transition {
        subsystem: Arc::clone(id),
        from,
        to,
        reason,
    }
}
