//! # Recovery machine: the synchronous decision core of the orchestrator.
//!
//! [`RecoveryMachine`] consumes detector transitions, timer expirations and
//! delivery results, and answers with [`Effect`]s for the async
//! [`Orchestrator`](crate::recovery::Orchestrator) to execute. It owns the
//! action history and the per-subsystem restart budgets.
//!
//! ## Decisions
//! ```text
//! Healthy → Degraded        log; arm patience; ThrottleInput (opt-in)
//! Degraded for patience     Restart
//! → Unresponsive            Restart (unless one is pending)
//! Recovering → Healthy      pending Restart Succeeded
//! recovery timeout / Failed pending Restart Failed → Isolate + Escalate (critical)
//! budget spent              BudgetExceeded → Isolate + Escalate (critical), no Restart
//! Restart undeliverable     Escalate (warning); retry after delivery_retry
//! ```
//!
//! ## Rules
//! - At most one pending Restart per subsystem.
//! - Every action reaches a terminal outcome.
//! - Isolation is permanent until [`RecoveryMachine::acknowledge`].
//! - Finished actions beyond `history_limit` are forgotten, oldest first;
//!   restart counters are kept separately and never shrink.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::detector::HealthState;
use crate::envelope::ControlCommand;
use crate::error::MonitorError;
use crate::events::{EventKind, MonitorEvent};

use super::action::{ActionKind, Outcome, RecoveryAction};
use super::alert::Severity;
use super::budget::RestartBudget;

/// Input rate a throttled subsystem is asked to keep.
const THROTTLE_FACTOR: f64 = 0.5;

/// Side effect requested by the machine.
#[derive(Debug, Clone)]
pub enum Effect {
    /// Publish `command` on `control.<target>`; report with [`RecoveryMachine::delivered`].
    Issue {
        action_id: u64,
        target: Arc<str>,
        command: ControlCommand,
    },
    /// Send an alert; report with [`RecoveryMachine::alert_delivered`].
    Alert {
        action_id: u64,
        target: Arc<str>,
        severity: Severity,
        reason: String,
    },
    /// Call [`RecoveryMachine::on_recovery_timeout`] after `after`.
    ArmRecoveryTimer { action_id: u64, after: Duration },
    CancelRecoveryTimer { action_id: u64 },
    /// Call [`RecoveryMachine::on_patience_elapsed`] after `after`, replacing any armed one.
    ArmPatience { target: Arc<str>, after: Duration },
    CancelPatience { target: Arc<str> },
    /// Call [`RecoveryMachine::on_retry_elapsed`] after `after`, replacing any armed one.
    ArmRetry { target: Arc<str>, after: Duration },
    /// Publish a monitor event.
    Emit(MonitorEvent),
}

/// Recovery knobs taken from [`MonitorConfig`].
#[derive(Debug, Clone, Copy)]
pub struct RecoveryPolicy {
    pub max_restarts: usize,
    pub restart_window: Duration,
    pub recovery_timeout: Duration,
    pub degraded_patience: Option<Duration>,
    pub throttle_on_degraded: bool,
    pub delivery_retry: Duration,
    pub history_limit: usize,
}

impl From<&MonitorConfig> for RecoveryPolicy {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            max_restarts: cfg.max_restarts,
            restart_window: cfg.restart_window,
            recovery_timeout: cfg.recovery_timeout,
            degraded_patience: cfg.degraded_patience(),
            throttle_on_degraded: cfg.throttle_on_degraded,
            delivery_retry: cfg.delivery_retry,
            history_limit: cfg.history_limit,
        }
    }
}

/// Recovery view of one subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryStatus {
    /// A delivered Restart awaits confirmation.
    pub restart_pending: bool,
    /// Automatic recovery is suspended until acknowledged.
    pub isolated: bool,
}

#[derive(Debug)]
struct Track {
    state: HealthState,
    pending_restart: Option<u64>,
    isolated: bool,
    budget: RestartBudget,
    restarts: usize,
}

/// Per-subsystem recovery state machine.
#[derive(Debug)]
pub struct RecoveryMachine {
    policy: RecoveryPolicy,
    tracks: HashMap<Arc<str>, Track>,
    actions: BTreeMap<u64, RecoveryAction>,
    finished: VecDeque<u64>,
    next_id: u64,
}

impl RecoveryMachine {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            tracks: HashMap::new(),
            actions: BTreeMap::new(),
            finished: VecDeque::new(),
            next_id: 1,
        }
    }

    /// Retained actions, oldest first: every pending one plus the most
    /// recent `history_limit` finished ones.
    pub fn actions(&self) -> impl Iterator<Item = &RecoveryAction> + '_ {
        self.actions.values()
    }

    pub fn action(&self, id: u64) -> Option<&RecoveryAction> {
        self.actions.get(&id)
    }

    /// Retained actions targeting one subsystem.
    pub fn actions_for<'a>(&'a self, target: &'a str) -> impl Iterator<Item = &'a RecoveryAction> + 'a {
        self.actions.values().filter(move |a| a.target.as_ref() == target)
    }

    /// The pending Restart of a subsystem.
    pub fn pending_restart(&self, target: &str) -> Option<&RecoveryAction> {
        let id = self.tracks.get(target)?.pending_restart?;
        self.action(id)
    }

    /// True while a subsystem is isolated.
    pub fn is_isolated(&self, target: &str) -> bool {
        self.tracks.get(target).is_some_and(|t| t.isolated)
    }

    /// Restarts ever issued to one subsystem.
    pub fn restarts_issued(&self, target: &str) -> usize {
        self.tracks.get(target).map_or(0, |t| t.restarts)
    }

    /// Restarts ever issued across all subsystems.
    pub fn restarts_total(&self) -> usize {
        self.tracks.values().map(|t| t.restarts).sum()
    }

    /// Recovery view of every known subsystem.
    pub fn statuses(&self) -> Vec<(Arc<str>, RecoveryStatus)> {
        self.tracks
            .iter()
            .map(|(id, t)| {
                (
                    Arc::clone(id),
                    RecoveryStatus {
                        restart_pending: t.pending_restart.is_some(),
                        isolated: t.isolated,
                    },
                )
            })
            .collect()
    }

    /// Reacts to a detector transition.
    ///
    /// A transition into the state already recorded for the subsystem is a
    /// duplicate and changes nothing.
    pub fn on_state_changed(
        &mut self,
        target: &str,
        from: HealthState,
        to: HealthState,
        reason: &str,
        now: Instant,
    ) -> Vec<Effect> {
        let target = self.track_key(target);
        let track = self.track(&target);
        if track.state == to {
            return Vec::new();
        }
        track.state = to;
        let pending = track.pending_restart;
        let isolated = track.isolated;

        let mut fx = Vec::new();
        match to {
            HealthState::Degraded => {
                info!(subsystem = %target, reason, "subsystem degraded");
                if let Some(after) = self.policy.degraded_patience {
                    fx.push(Effect::ArmPatience {
                        target: Arc::clone(&target),
                        after,
                    });
                }
                if self.policy.throttle_on_degraded && !isolated && from == HealthState::Healthy {
                    fx.extend(self.issue(&target, ActionKind::ThrottleInput, reason, now).1);
                }
            }
            HealthState::Unresponsive => {
                fx.push(cancel_patience(&target));
                fx.extend(self.request_restart(&target, reason, now));
            }
            HealthState::Healthy => {
                fx.push(cancel_patience(&target));
                if from == HealthState::Recovering {
                    if let Some(id) = pending {
                        self.track(&target).pending_restart = None;
                        fx.extend(self.finish(id, Outcome::Succeeded, "telemetry confirmed healthy", now));
                        fx.push(Effect::CancelRecoveryTimer { action_id: id });
                    }
                }
            }
            HealthState::Recovering => fx.push(cancel_patience(&target)),
            HealthState::Failed => {
                fx.push(cancel_patience(&target));
                if let Some(id) = pending {
                    fx.extend(self.on_recovery_timeout(id, now));
                } else if !isolated {
                    fx.extend(self.escalate(&target, reason.to_string(), now));
                }
            }
        }
        fx
    }

    /// Replays decided states the event stream failed to deliver.
    ///
    /// A subsystem reported `Healthy` while a Restart is pending counts as
    /// confirmed, since the detector only leaves `Recovering` that way.
    pub fn resync(&mut self, states: &[(Arc<str>, HealthState)], now: Instant) -> Vec<Effect> {
        let mut fx = Vec::new();
        for (id, state) in states {
            let (known, pending) = self
                .tracks
                .get(id.as_ref())
                .map_or((HealthState::Healthy, false), |t| (t.state, t.pending_restart.is_some()));
            if known == *state {
                continue;
            }
            let from = if *state == HealthState::Healthy && pending {
                HealthState::Recovering
            } else {
                known
            };
            debug!(subsystem = %id, from = %known, to = %state, "recovery state resynchronized");
            fx.extend(self.on_state_changed(id, from, *state, "resynchronized after lag", now));
        }
        fx
    }

    /// The recovery timer of a Restart expired.
    pub fn on_recovery_timeout(&mut self, action_id: u64, now: Instant) -> Vec<Effect> {
        let Some(action) = self.action(action_id) else {
            return Vec::new();
        };
        if !action.is_pending() || action.kind != ActionKind::Restart {
            return Vec::new();
        }
        let target = Arc::clone(&action.target);
        let err = MonitorError::ActionTimeout {
            subsystem: target.to_string(),
            timeout: self.policy.recovery_timeout,
        };
        warn!(subsystem = %target, action_id, error = err.as_label(), "restart not confirmed in time");

        self.track(&target).pending_restart = None;
        let mut fx = self.finish(action_id, Outcome::Failed, err.to_string(), now);
        fx.push(Effect::CancelRecoveryTimer { action_id });
        if !self.is_isolated(&target) {
            fx.extend(self.escalate(&target, err.to_string(), now));
        }
        fx
    }

    /// The degradation patience of a subsystem elapsed.
    pub fn on_patience_elapsed(&mut self, target: &str, now: Instant) -> Vec<Effect> {
        let target = self.track_key(target);
        if self.track(&target).state != HealthState::Degraded {
            return Vec::new();
        }
        let reason = match self.policy.degraded_patience {
            Some(p) => format!("degraded for longer than {p:?}"),
            None => "degraded".to_string(),
        };
        self.request_restart(&target, &reason, now)
    }

    /// The retry delay after an undeliverable Restart elapsed.
    ///
    /// Retries count against the restart budget, so a subsystem that stays
    /// unreachable ends up isolated.
    pub fn on_retry_elapsed(&mut self, target: &str, now: Instant) -> Vec<Effect> {
        let target = self.track_key(target);
        let state = self.track(&target).state;
        if !matches!(state, HealthState::Unresponsive | HealthState::Degraded) {
            debug!(subsystem = %target, state = %state, "retry no longer needed");
            return Vec::new();
        }
        self.request_restart(&target, "retrying undelivered restart", now)
    }

    /// Delivery result of an [`Effect::Issue`].
    pub fn delivered(&mut self, action_id: u64, result: Result<(), String>, now: Instant) -> Vec<Effect> {
        let Some(action) = self.action(action_id) else {
            return Vec::new();
        };
        if !action.is_pending() {
            return Vec::new();
        }
        let (kind, target, reason) = (action.kind, Arc::clone(&action.target), Arc::clone(&action.reason));

        match result {
            Ok(()) => {
                info!(subsystem = %target, action = kind.as_str(), action_id, reason = %reason, "recovery action issued");
                let mut fx = vec![Effect::Emit(
                    MonitorEvent::new(EventKind::ActionIssued)
                        .with_subsystem(Arc::clone(&target))
                        .with_action(kind, action_id)
                        .with_reason(reason),
                )];
                match kind {
                    ActionKind::Restart => fx.push(Effect::ArmRecoveryTimer {
                        action_id,
                        after: self.policy.recovery_timeout,
                    }),
                    _ => fx.extend(self.finish(action_id, Outcome::Succeeded, "delivered", now)),
                }
                fx
            }
            Err(e) => {
                warn!(subsystem = %target, action = kind.as_str(), action_id, error = %e, "recovery action undeliverable");
                let track = self.track(&target);
                let was_pending_restart = track.pending_restart == Some(action_id);
                if was_pending_restart {
                    track.pending_restart = None;
                }
                let mut fx = self.finish(action_id, Outcome::Failed, e.clone(), now);
                if was_pending_restart {
                    fx.extend(self.raise(
                        &target,
                        Severity::Warning,
                        format!("restart could not be delivered: {e}"),
                        now,
                    ));
                    fx.push(Effect::ArmRetry {
                        target,
                        after: self.policy.delivery_retry,
                    });
                }
                fx
            }
        }
    }

    /// Delivery result of an [`Effect::Alert`].
    pub fn alert_delivered(
        &mut self,
        action_id: u64,
        severity: Severity,
        result: Result<(), String>,
        now: Instant,
    ) -> Vec<Effect> {
        let Some(action) = self.action(action_id) else {
            return Vec::new();
        };
        let (target, reason) = (Arc::clone(&action.target), Arc::clone(&action.reason));
        match result {
            Ok(()) => {
                let mut fx = vec![Effect::Emit(
                    MonitorEvent::new(EventKind::AlertRaised)
                        .with_subsystem(target)
                        .with_action(ActionKind::Escalate, action_id)
                        .with_severity(severity)
                        .with_reason(reason),
                )];
                fx.extend(self.finish(action_id, Outcome::Succeeded, "alert delivered", now));
                fx
            }
            Err(e) => self.finish(action_id, Outcome::Failed, e, now),
        }
    }

    /// Operator acknowledgement: clears isolation and the restart history.
    pub fn acknowledge(&mut self, target: &str) -> Vec<Effect> {
        let Some(track) = self.tracks.get_mut(target) else {
            return Vec::new();
        };
        info!(subsystem = target, was_isolated = track.isolated, "subsystem acknowledged");
        track.isolated = false;
        track.budget.reset();
        vec![cancel_patience(&Arc::from(target))]
    }

    fn request_restart(&mut self, target: &Arc<str>, reason: &str, now: Instant) -> Vec<Effect> {
        let track = self.track(target);
        if track.isolated {
            debug!(subsystem = %target, "isolated, restart suppressed");
            return Vec::new();
        }
        if track.pending_restart.is_some() {
            debug!(subsystem = %target, "restart already pending");
            return Vec::new();
        }

        match track.budget.try_acquire(now) {
            Ok(()) => {
                track.restarts += 1;
                let (id, fx) = self.issue(target, ActionKind::Restart, reason, now);
                self.track(target).pending_restart = Some(id);
                fx
            }
            Err(used) => {
                let err = MonitorError::RestartBudgetExceeded {
                    subsystem: target.to_string(),
                    restarts: used,
                    window: track.budget.window(),
                };
                warn!(subsystem = %target, restarts = used, error = err.as_label(), "restart budget exceeded");
                let mut fx = vec![Effect::Emit(
                    MonitorEvent::new(EventKind::BudgetExceeded)
                        .with_subsystem(Arc::clone(target))
                        .with_reason(err.to_string()),
                )];
                fx.extend(self.escalate(target, err.to_string(), now));
                fx
            }
        }
    }

    /// Isolates the subsystem and raises a critical alert; a pending Restart
    /// is superseded.
    fn escalate(&mut self, target: &Arc<str>, reason: String, now: Instant) -> Vec<Effect> {
        let track = self.track(target);
        track.isolated = true;
        let superseded = track.pending_restart.take();

        let mut fx = vec![cancel_patience(target)];
        if let Some(id) = superseded {
            fx.extend(self.finish(id, Outcome::Failed, "superseded by isolation", now));
            fx.push(Effect::CancelRecoveryTimer { action_id: id });
        }
        fx.extend(self.issue(target, ActionKind::Isolate, &reason, now).1);
        fx.extend(self.raise(target, Severity::Critical, reason, now));
        fx
    }

    /// Creates an `Escalate` action whose outcome follows the alert sinks.
    fn raise(&mut self, target: &Arc<str>, severity: Severity, reason: String, now: Instant) -> Vec<Effect> {
        let id = self.create(target, ActionKind::Escalate, &reason, now);
        warn!(subsystem = %target, severity = severity.as_str(), reason = %reason, "escalating");
        vec![
            Effect::Emit(
                MonitorEvent::new(EventKind::ActionIssued)
                    .with_subsystem(Arc::clone(target))
                    .with_action(ActionKind::Escalate, id)
                    .with_severity(severity)
                    .with_reason(reason.clone()),
            ),
            Effect::Alert {
                action_id: id,
                target: Arc::clone(target),
                severity,
                reason,
            },
        ]
    }

    fn issue(&mut self, target: &Arc<str>, kind: ActionKind, reason: &str, now: Instant) -> (u64, Vec<Effect>) {
        let id = self.create(target, kind, reason, now);
        let mut command = ControlCommand::new(kind).with_reason(reason);
        if kind == ActionKind::ThrottleInput {
            command = command.with_parameter("factor", THROTTLE_FACTOR);
        }
        (
            id,
            vec![Effect::Issue {
                action_id: id,
                target: Arc::clone(target),
                command,
            }],
        )
    }

    fn create(&mut self, target: &Arc<str>, kind: ActionKind, reason: &str, now: Instant) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.actions
            .insert(id, RecoveryAction::new(id, Arc::clone(target), kind, reason, now));
        id
    }

    fn finish(&mut self, action_id: u64, outcome: Outcome, detail: impl Into<Arc<str>>, now: Instant) -> Vec<Effect> {
        let Some(action) = self.actions.get_mut(&action_id) else {
            return Vec::new();
        };
        let detail: Arc<str> = detail.into();
        if !action.complete(outcome, Arc::clone(&detail), now) {
            return Vec::new();
        }
        let kind = match outcome {
            Outcome::Succeeded => EventKind::ActionSucceeded,
            _ => EventKind::ActionFailed,
        };
        info!(subsystem = %action.target, action = action.kind.as_str(), action_id, outcome = ?outcome, detail = %detail, "recovery action finished");
        let fx = vec![Effect::Emit(
            MonitorEvent::new(kind)
                .with_subsystem(Arc::clone(&action.target))
                .with_action(action.kind, action_id)
                .with_reason(detail),
        )];

        self.finished.push_back(action_id);
        while self.finished.len() > self.policy.history_limit {
            if let Some(old) = self.finished.pop_front() {
                self.actions.remove(&old);
            }
        }
        fx
    }

    fn track_key(&self, target: &str) -> Arc<str> {
        self.tracks
            .get_key_value(target)
            .map(|(k, _)| Arc::clone(k))
            .unwrap_or_else(|| Arc::from(target))
    }

    fn track(&mut self, target: &Arc<str>) -> &mut Track {
        let (max, window) = (self.policy.max_restarts, self.policy.restart_window);
        self.tracks.entry(Arc::clone(target)).or_insert_with(|| Track {
            state: HealthState::Healthy,
            pending_restart: None,
            isolated: false,
            budget: RestartBudget::new(max, window),
            restarts: 0,
        })
    }
}

fn cancel_patience(target: &Arc<str>) -> Effect {
    Effect::CancelPatience {
        target: Arc::clone(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HealthState::*;

    fn machine() -> RecoveryMachine {
        RecoveryMachine::new(RecoveryPolicy::from(&MonitorConfig::default()))
    }

    fn issued(fx: &[Effect]) -> Vec<(u64, ActionKind)> {
        fx.iter()
            .filter_map(|e| match e {
                Effect::Issue { action_id, command, .. } => Some((*action_id, command.action)),
                _ => None,
            })
            .collect()
    }

    fn alerts(fx: &[Effect]) -> usize {
        fx.iter().filter(|e| matches!(e, Effect::Alert { .. })).count()
    }

    /// Drives one full restart that is confirmed healthy.
    fn restart_cycle(m: &mut RecoveryMachine, now: Instant) -> Vec<Effect> {
        let fx = m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        for (id, _) in issued(&fx) {
            m.delivered(id, Ok(()), now);
        }
        m.on_state_changed("motor-1", Unresponsive, Recovering, "restart issued", now);
        m.on_state_changed("motor-1", Recovering, Healthy, "confirmed", now);
        fx
    }

    #[test]
    fn unresponsive_issues_exactly_one_restart() {
        let now = Instant::now();
        let mut m = machine();
        let fx = m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        assert_eq!(issued(&fx), vec![(1, ActionKind::Restart)]);

        // a second report while pending is ignored
        let fx = m.on_state_changed("motor-1", Degraded, Unresponsive, "silent", now);
        assert!(issued(&fx).is_empty());
        assert_eq!(m.pending_restart("motor-1").map(|a| a.id), Some(1));
    }

    #[test]
    fn delivery_arms_the_timer_and_healthy_confirms() {
        let now = Instant::now();
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        let fx = m.delivered(1, Ok(()), now);
        assert!(fx.iter().any(|e| matches!(e, Effect::ArmRecoveryTimer { action_id: 1, .. })));
        assert!(fx.iter().any(|e| matches!(e, Effect::Emit(ev) if ev.kind == EventKind::ActionIssued)));

        m.on_state_changed("motor-1", Unresponsive, Recovering, "restart issued", now);
        let fx = m.on_state_changed("motor-1", Recovering, Healthy, "confirmed", now);
        assert!(fx.iter().any(|e| matches!(e, Effect::CancelRecoveryTimer { action_id: 1 })));
        assert_eq!(m.action(1).unwrap().outcome, Outcome::Succeeded);
        assert!(m.pending_restart("motor-1").is_none());
    }

    #[test]
    fn timeout_fails_restart_and_escalates_once() {
        let now = Instant::now();
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        m.delivered(1, Ok(()), now);

        let fx = m.on_recovery_timeout(1, now);
        assert_eq!(m.action(1).unwrap().outcome, Outcome::Failed);
        assert!(m.action(1).unwrap().detail.as_deref().unwrap().contains("not confirmed"));
        assert_eq!(issued(&fx).len(), 1);
        assert_eq!(issued(&fx)[0].1, ActionKind::Isolate);
        assert_eq!(alerts(&fx), 1);
        assert!(m.is_isolated("motor-1"));

        // the detector's Failed reclassification arrives afterwards
        let fx = m.on_state_changed("motor-1", Recovering, Failed, "timeout", now);
        assert!(issued(&fx).is_empty());
        assert_eq!(alerts(&fx), 0);
        assert!(m.on_recovery_timeout(1, now).is_empty());
    }

    #[test]
    fn detector_failure_first_is_handled_the_same() {
        let now = Instant::now();
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        m.delivered(1, Ok(()), now);
        let fx = m.on_state_changed("motor-1", Recovering, Failed, "timeout", now);
        assert_eq!(m.action(1).unwrap().outcome, Outcome::Failed);
        assert_eq!(issued(&fx)[0].1, ActionKind::Isolate);
        assert!(m.on_recovery_timeout(1, now).is_empty());
    }

    #[test]
    fn fourth_restart_in_window_isolates_instead() {
        let now = Instant::now();
        let mut m = machine();
        for _ in 0..3 {
            let fx = restart_cycle(&mut m, now);
            assert_eq!(issued(&fx)[0].1, ActionKind::Restart);
        }

        let fx = m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        let kinds: Vec<_> = issued(&fx).into_iter().map(|(_, k)| k).collect();
        assert_eq!(kinds, vec![ActionKind::Isolate]);
        assert_eq!(alerts(&fx), 1);
        assert!(fx.iter().any(|e| matches!(e, Effect::Emit(ev) if ev.kind == EventKind::BudgetExceeded)));

        let restarts = m.actions_for("motor-1").filter(|a| a.kind == ActionKind::Restart).count();
        assert_eq!(restarts, 3);
        assert!(m.actions_for("motor-1").all(|a| a.kind != ActionKind::Restart || a.outcome == Outcome::Succeeded));
    }

    #[test]
    fn acknowledge_restores_automatic_recovery() {
        let now = Instant::now();
        let mut m = RecoveryMachine::new(RecoveryPolicy {
            max_restarts: 0,
            ..RecoveryPolicy::from(&MonitorConfig::default())
        });
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        assert!(m.is_isolated("motor-1"));
        assert!(issued(&m.on_state_changed("motor-1", Failed, Unresponsive, "silent", now)).is_empty());

        m.acknowledge("motor-1");
        assert!(!m.is_isolated("motor-1"));
    }

    #[test]
    fn degradation_arms_patience_and_optionally_throttles() {
        let now = Instant::now();
        let mut m = RecoveryMachine::new(RecoveryPolicy {
            throttle_on_degraded: true,
            ..RecoveryPolicy::from(&MonitorConfig::default())
        });
        let fx = m.on_state_changed("lidar", Healthy, Degraded, "slow", now);
        assert!(fx.iter().any(|e| matches!(e, Effect::ArmPatience { .. })));
        assert_eq!(issued(&fx)[0].1, ActionKind::ThrottleInput);

        let id = issued(&fx)[0].0;
        m.delivered(id, Ok(()), now);
        assert_eq!(m.action(id).unwrap().outcome, Outcome::Succeeded);

        let fx = m.on_patience_elapsed("lidar", now);
        assert_eq!(issued(&fx)[0].1, ActionKind::Restart);

        // patience firing after the subsystem recovered does nothing
        let mut m = machine();
        m.on_state_changed("lidar", Healthy, Degraded, "slow", now);
        m.on_state_changed("lidar", Degraded, Healthy, "ok", now);
        assert!(m.on_patience_elapsed("lidar", now).is_empty());
    }

    #[test]
    fn undeliverable_restart_warns_and_retries_within_budget() {
        let now = Instant::now();
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        let fx = m.delivered(1, Err("control topic full".into()), now);
        assert!(fx.iter().any(|e| matches!(e, Effect::Emit(ev) if ev.kind == EventKind::ActionFailed)));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Alert { severity: Severity::Warning, reason, .. } if reason.contains("control topic full")
        )));
        assert!(fx.iter().any(|e| matches!(e, Effect::ArmRetry { .. })));
        assert!(m.pending_restart("motor-1").is_none());
        assert!(!m.is_isolated("motor-1"));

        // still unresponsive when the retry fires: a new restart goes out
        let fx = m.on_retry_elapsed("motor-1", now);
        assert_eq!(issued(&fx)[0].1, ActionKind::Restart);
        assert_eq!(m.restarts_issued("motor-1"), 2);

        // a subsystem that stays unreachable spends its budget and is isolated
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        for _ in 0..3 {
            let id = m.pending_restart("motor-1").unwrap().id;
            m.delivered(id, Err("control topic full".into()), now);
            m.on_retry_elapsed("motor-1", now);
        }
        assert!(m.is_isolated("motor-1"));
        assert!(m.actions().any(|a| a.kind == ActionKind::Isolate));
    }

    #[test]
    fn retry_after_recovery_does_nothing() {
        let now = Instant::now();
        let mut m = machine();
        m.on_state_changed("motor-1", Healthy, Unresponsive, "silent", now);
        m.delivered(1, Err("seal failed".into()), now);
        m.on_state_changed("motor-1", Unresponsive, Healthy, "telemetry resumed", now);
        assert!(m.on_retry_elapsed("motor-1", now).is_empty());
    }

    #[test]
    fn finished_actions_beyond_the_history_limit_are_forgotten() {
        let now = Instant::now();
        let mut m = RecoveryMachine::new(RecoveryPolicy {
            history_limit: 2,
            max_restarts: 10,
            ..RecoveryPolicy::from(&MonitorConfig::default())
        });
        for _ in 0..4 {
            restart_cycle(&mut m, now);
        }
        let ids: Vec<u64> = m.actions().map(|a| a.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(m.action(1).is_none());
        assert_eq!(m.restarts_issued("motor-1"), 4);
        assert_eq!(m.restarts_total(), 4);

        // pending actions are never pruned
        m.on_state_changed("arm", Healthy, Unresponsive, "silent", now);
        restart_cycle(&mut m, now);
        restart_cycle(&mut m, now);
        let ids: Vec<u64> = m.actions().map(|a| a.id).collect();
        assert_eq!(ids, vec![5, 6, 7]);
        assert!(m.action(5).unwrap().is_pending());
    }

    #[test]
    fn duplicate_transitions_are_ignored() {
        let now = Instant::now();
        let mut m = RecoveryMachine::new(RecoveryPolicy {
            throttle_on_degraded: true,
            ..RecoveryPolicy::from(&MonitorConfig::default())
        });
        assert_eq!(issued(&m.on_state_changed("lidar", Healthy, Degraded, "slow", now)).len(), 1);
        assert!(m.on_state_changed("lidar", Healthy, Degraded, "slow", now).is_empty());
    }

    #[test]
    fn resync_replays_missed_transitions() {
        let now = Instant::now();
        let mut m = machine();
        let fx = m.resync(&[(Arc::from("motor-1"), Unresponsive), (Arc::from("lidar"), Healthy)], now);
        assert_eq!(issued(&fx), vec![(1, ActionKind::Restart)]);
        m.delivered(1, Ok(()), now);

        // the Recovering and Healthy events were both lost
        m.resync(&[(Arc::from("motor-1"), Healthy)], now);
        assert_eq!(m.action(1).unwrap().outcome, Outcome::Succeeded);
        assert!(m.resync(&[(Arc::from("motor-1"), Healthy)], now).is_empty());

        assert_eq!(
            m.statuses(),
            vec![(
                Arc::<str>::from("motor-1"),
                RecoveryStatus {
                    restart_pending: false,
                    isolated: false
                }
            )]
        );
    }
}
