//! # Recovery orchestrator task.
//!
//! Drives a shared [`RecoveryMachine`] from monitor events and timers, and
//! executes the effects it returns:
//!
//! ```text
//!   EventBus ── StateChanged / Acknowledged ──┐
//!   DelayQueue ── recovery / patience / retry ┼──► RecoveryMachine ──► Vec<Effect>
//!   JoinSet ── alert outcome ─────────────────┤                          │
//!                                             │                          │
//!                         delivered ◄─────────┴──────────────────────────┤
//!                                                                        ├─ Issue  → control.<id> (sealed)
//!                                                                        ├─ Alert  → own task → AlertSink::notify
//!                                                                        ├─ Arm/Cancel → DelayQueue
//!                                                                        └─ Emit   → EventBus
//! ```
//!
//! The machine lock is never held across an `.await`, and the loop never
//! awaits a sink: each alert runs on its own task and its outcome comes back
//! through the `JoinSet`. After lagging behind the event stream the
//! orchestrator reconciles the machine with the detector's [`HealthBoard`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::time::{DelayQueue, delay_queue};
use tracing::{debug, warn};

use crate::bus::{Published, Publisher, TopicConfig};
use crate::detector::HealthBoard;
use crate::envelope::{ControlCommand, PayloadKind, control_topic};
use crate::error::BusError;
use crate::events::{EventBus, EventKind, MonitorEvent};
use crate::security::SealedBus;

use super::alert::{AlertSink, Severity};
use super::machine::{Effect, RecoveryMachine};

/// Sender id stamped on control envelopes.
pub const ORCHESTRATOR_ID: &str = "orchestrator";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Timer {
    Recovery(u64),
    Patience(Arc<str>),
    Retry(Arc<str>),
}

/// Outcome of one alert task.
struct AlertDone {
    action_id: u64,
    severity: Severity,
    result: Result<(), String>,
}

/// Event-driven executor of recovery decisions.
pub struct Orchestrator {
    machine: Arc<Mutex<RecoveryMachine>>,
    bus: SealedBus,
    publisher: Publisher,
    control_config: TopicConfig,
    ensured: HashSet<String>,
    events: EventBus,
    sinks: Arc<[Arc<dyn AlertSink>]>,
    board: Option<HealthBoard>,
    alerts: JoinSet<AlertDone>,
    timers: DelayQueue<Timer>,
    recovery_keys: HashMap<u64, delay_queue::Key>,
    patience_keys: HashMap<Arc<str>, delay_queue::Key>,
    retry_keys: HashMap<Arc<str>, delay_queue::Key>,
}

impl Orchestrator {
    pub fn new(
        machine: Arc<Mutex<RecoveryMachine>>,
        bus: SealedBus,
        control_config: TopicConfig,
        events: EventBus,
        sinks: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        let publisher = bus.bus().publisher(ORCHESTRATOR_ID);
        Self {
            machine,
            bus,
            publisher,
            control_config,
            ensured: HashSet::new(),
            events,
            sinks: sinks.into(),
            board: None,
            alerts: JoinSet::new(),
            timers: DelayQueue::new(),
            recovery_keys: HashMap::new(),
            patience_keys: HashMap::new(),
            retry_keys: HashMap::new(),
        }
    }

    /// Detector board used to catch up after lagging behind the event stream.
    pub fn with_health_board(mut self, board: HealthBoard) -> Self {
        self.board = Some(board);
        self
    }

    /// Shared handle to the decision core (action history, isolation).
    pub fn machine(&self) -> Arc<Mutex<RecoveryMachine>> {
        Arc::clone(&self.machine)
    }

    /// Runs until `token` is cancelled, then waits for alerts still in flight.
    pub async fn run(mut self, mut rx: broadcast::Receiver<MonitorEvent>, token: CancellationToken) {
        let mut events_open = true;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = rx.recv(), if events_open => match ev {
                    Ok(ev) => self.on_event(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "orchestrator lagged behind monitor events");
                        self.resync();
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                Some(expired) = self.timers.next(), if !self.timers.is_empty() => {
                    self.on_timer(expired.into_inner());
                }
                Some(done) = self.alerts.join_next(), if !self.alerts.is_empty() => {
                    self.on_alert_done(done);
                }
            }
        }
        while let Some(done) = self.alerts.join_next().await {
            self.on_alert_done(done);
        }
        debug!(pending_timers = self.timers.len(), "orchestrator stopped");
    }

    /// Feeds one monitor event to the machine and executes the result.
    pub fn on_event(&mut self, ev: &MonitorEvent) {
        let Some(id) = ev.subsystem.as_deref() else {
            return;
        };
        let now = Instant::now();
        let effects = match (ev.kind, ev.from, ev.to) {
            (EventKind::StateChanged, Some(from), Some(to)) => {
                let reason = ev.reason.as_deref().unwrap_or_default();
                self.machine.lock().on_state_changed(id, from, to, reason, now)
            }
            (EventKind::Acknowledged, _, _) => self.machine.lock().acknowledge(id),
            _ => return,
        };
        self.execute(effects);
    }

    /// Replays the board's decided states into the machine.
    ///
    /// Returns the number of effects executed.
    pub fn resync(&mut self) -> usize {
        let Some(board) = &self.board else {
            return 0;
        };
        let states = board.snapshot();
        let effects = self.machine.lock().resync(&states, Instant::now());
        let n = effects.len();
        self.execute(effects);
        n
    }

    fn on_timer(&mut self, timer: Timer) {
        let now = Instant::now();
        let effects = match timer {
            Timer::Recovery(action_id) => {
                self.recovery_keys.remove(&action_id);
                self.machine.lock().on_recovery_timeout(action_id, now)
            }
            Timer::Patience(target) => {
                self.patience_keys.remove(&target);
                self.machine.lock().on_patience_elapsed(&target, now)
            }
            Timer::Retry(target) => {
                self.retry_keys.remove(&target);
                self.machine.lock().on_retry_elapsed(&target, now)
            }
        };
        self.execute(effects);
    }

    fn on_alert_done(&mut self, done: Result<AlertDone, JoinError>) {
        match done {
            Ok(done) => {
                let effects = self.machine.lock().alert_delivered(
                    done.action_id,
                    done.severity,
                    done.result,
                    Instant::now(),
                );
                self.execute(effects);
            }
            Err(e) => warn!(error = %e, "alert task aborted"),
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        let mut queue: VecDeque<Effect> = effects.into();
        while let Some(effect) = queue.pop_front() {
            match effect {
                Effect::Issue {
                    action_id,
                    target,
                    command,
                } => {
                    let result = self.deliver(&target, &command);
                    let next = self.machine.lock().delivered(action_id, result, Instant::now());
                    queue.extend(next);
                }
                Effect::Alert {
                    action_id,
                    target,
                    severity,
                    reason,
                } => {
                    let sinks = Arc::clone(&self.sinks);
                    self.alerts.spawn(async move {
                        let result = notify_all(&sinks, &target, severity, &reason).await;
                        AlertDone {
                            action_id,
                            severity,
                            result,
                        }
                    });
                }
                Effect::ArmRecoveryTimer { action_id, after } => {
                    let key = self.timers.insert(Timer::Recovery(action_id), after);
                    if let Some(old) = self.recovery_keys.insert(action_id, key) {
                        self.timers.remove(&old);
                    }
                }
                Effect::CancelRecoveryTimer { action_id } => {
                    if let Some(key) = self.recovery_keys.remove(&action_id) {
                        self.timers.remove(&key);
                    }
                }
                Effect::ArmPatience { target, after } => {
                    if let Some(old) = self.patience_keys.remove(&target) {
                        self.timers.remove(&old);
                    }
                    let key = self.timers.insert(Timer::Patience(Arc::clone(&target)), after);
                    self.patience_keys.insert(target, key);
                }
                Effect::CancelPatience { target } => {
                    if let Some(key) = self.patience_keys.remove(&target) {
                        self.timers.remove(&key);
                    }
                }
                Effect::ArmRetry { target, after } => {
                    if let Some(old) = self.retry_keys.remove(&target) {
                        self.timers.remove(&old);
                    }
                    let key = self.timers.insert(Timer::Retry(Arc::clone(&target)), after);
                    self.retry_keys.insert(target, key);
                }
                Effect::Emit(ev) => self.events.publish(ev),
            }
        }
    }

    /// Publishes a control command on `control.<target>`.
    fn deliver(&mut self, target: &str, command: &ControlCommand) -> Result<(), String> {
        let topic = control_topic(target);
        if !self.ensured.contains(&topic) {
            match self.bus.bus().create_topic(&topic, self.control_config) {
                // an existing registration is used as configured
                Ok(_) | Err(BusError::ConfigConflict { .. }) => {}
                Err(e) => return Err(e.to_string()),
            }
            self.ensured.insert(topic.clone());
        }

        let payload = command.to_bytes().map_err(|e| e.to_string())?;
        match self
            .bus
            .send(&self.publisher, &topic, PayloadKind::Command, payload)
            .map_err(|e| e.to_string())?
        {
            Published::Dropped => Err(format!("control topic '{topic}' is full")),
            Published::Stored | Published::Overwrote => Ok(()),
        }
    }
}

/// Sends an alert to every sink; fails if any sink fails or panics.
async fn notify_all(
    sinks: &[Arc<dyn AlertSink>],
    target: &str,
    severity: Severity,
    reason: &str,
) -> Result<(), String> {
    let mut failures = Vec::new();
    for sink in sinks {
        match AssertUnwindSafe(sink.notify(target, severity, reason))
            .catch_unwind()
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(subsystem = target, sink = sink.name(), error = e.as_label(), "alert delivery failed");
                failures.push(e.to_string());
            }
            Err(_) => {
                warn!(subsystem = target, sink = sink.name(), "alert sink panicked");
                failures.push(format!("sink '{}' panicked", sink.name()));
            }
        }
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(failures.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::MonitorConfig;
    use crate::bus::SharedBus;
    use crate::detector::HealthState;
    use crate::error::AlertError;
    use crate::recovery::{ActionKind, AlertLog, Outcome, RecoveryPolicy};
    use crate::security::Plaintext;

    struct Refusing;

    #[async_trait::async_trait]
    impl AlertSink for Refusing {
        async fn notify(&self, _: &str, _: Severity, _: &str) -> Result<(), AlertError> {
            Err(AlertError::Delivery {
                sink: "refusing",
                reason: "offline".into(),
            })
        }
    }

    /// Pager that takes a long time to answer.
    struct Sluggish(Duration);

    #[async_trait::async_trait]
    impl AlertSink for Sluggish {
        async fn notify(&self, _: &str, _: Severity, _: &str) -> Result<(), AlertError> {
            tokio::time::sleep(self.0).await;
            Ok(())
        }
    }

    fn orchestrator(
        cfg: &MonitorConfig,
        sinks: Vec<Arc<dyn AlertSink>>,
        capacity: usize,
    ) -> (Orchestrator, SharedBus, EventBus) {
        let bus = SharedBus::new();
        let events = EventBus::new(capacity);
        let machine = Arc::new(Mutex::new(RecoveryMachine::new(RecoveryPolicy::from(cfg))));
        let orch = Orchestrator::new(
            machine,
            SealedBus::new(bus.clone(), Arc::new(Plaintext)),
            cfg.control_topic_config(),
            events.clone(),
            sinks,
        );
        (orch, bus, events)
    }

    fn changed(id: &str, from: HealthState, to: HealthState) -> MonitorEvent {
        MonitorEvent::new(EventKind::StateChanged)
            .with_subsystem(id)
            .with_transition(from, to)
            .with_reason("test")
    }

    async fn settle_alerts(orch: &mut Orchestrator) {
        while let Some(done) = orch.alerts.join_next().await {
            orch.on_alert_done(done);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restart_is_published_on_the_control_topic() {
        let cfg = MonitorConfig::default();
        let (mut orch, bus, events) = orchestrator(&cfg, vec![], 64);
        let mut rx = events.subscribe();

        orch.on_event(&changed("motor-1", HealthState::Healthy, HealthState::Unresponsive));

        let sub = bus.subscribe("control.motor-1").unwrap();
        let env = sub.poll().into_envelope().unwrap();
        assert_eq!(env.sender_id.as_ref(), ORCHESTRATOR_ID);
        assert_eq!(env.payload_kind, PayloadKind::Command);
        let cmd = ControlCommand::from_bytes(&env.payload).unwrap();
        assert_eq!(cmd.action, ActionKind::Restart);

        let ev = rx.recv().await.unwrap();
        assert_eq!((ev.kind, ev.action), (EventKind::ActionIssued, Some(ActionKind::Restart)));
        assert_eq!(orch.recovery_keys.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn recovery_timer_escalates_through_the_sinks() {
        let cfg = MonitorConfig::default();
        let log = Arc::new(AlertLog::new());
        let (mut orch, bus, _events) = orchestrator(&cfg, vec![log.clone(), Arc::new(Refusing)], 64);
        let machine = orch.machine();

        orch.on_event(&changed("motor-1", HealthState::Healthy, HealthState::Unresponsive));
        let expired = orch.timers.next().await.unwrap();
        assert_eq!(expired.get_ref(), &Timer::Recovery(1));
        orch.on_timer(expired.into_inner());
        settle_alerts(&mut orch).await;

        let m = machine.lock();
        let kinds: Vec<_> = m.actions().map(|a| (a.kind, a.outcome)).collect();
        assert_eq!(
            kinds,
            vec![
                (ActionKind::Restart, Outcome::Failed),
                (ActionKind::Isolate, Outcome::Succeeded),
                (ActionKind::Escalate, Outcome::Failed),
            ]
        );
        assert_eq!(log.pending().len(), 1);
        assert_eq!(bus.topic_stats("control.motor-1").unwrap().published, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn conflicting_control_topic_is_used_as_is() {
        let cfg = MonitorConfig::default();
        let (mut orch, bus, _events) = orchestrator(&cfg, vec![], 64);
        bus.create_topic("control.motor-1", TopicConfig::new(2)).unwrap();

        orch.on_event(&changed("motor-1", HealthState::Healthy, HealthState::Unresponsive));
        assert_eq!(bus.topic_stats("control.motor-1").unwrap().published, 1);
        let machine = orch.machine();
        assert_eq!(machine.lock().action(1).unwrap().outcome, Outcome::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sink_does_not_hold_back_other_subsystems() {
        let cfg = MonitorConfig::default();
        let sink: Arc<dyn AlertSink> = Arc::new(Sluggish(Duration::from_secs(30)));
        let (orch, bus, events) = orchestrator(&cfg, vec![sink], 64);
        let machine = orch.machine();
        let token = CancellationToken::new();
        let task = tokio::spawn(orch.run(events.subscribe(), token.clone()));

        events.publish(changed("motor-1", HealthState::Recovering, HealthState::Failed));
        events.publish(changed("arm-2", HealthState::Healthy, HealthState::Unresponsive));
        tokio::time::sleep(Duration::from_secs(1)).await;

        {
            let m = machine.lock();
            assert!(m.pending_restart("arm-2").is_some());
            let escalation = m
                .actions_for("motor-1")
                .find(|a| a.kind == ActionKind::Escalate)
                .unwrap();
            assert!(escalation.is_pending());
        }
        assert_eq!(bus.topic_stats("control.arm-2").unwrap().published, 1);

        tokio::time::sleep(Duration::from_secs(30)).await;
        {
            let m = machine.lock();
            let escalation = m
                .actions_for("motor-1")
                .find(|a| a.kind == ActionKind::Escalate)
                .unwrap();
            assert_eq!(escalation.outcome, Outcome::Succeeded);
        }

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_orchestrator_restarts_from_the_board() {
        let cfg = MonitorConfig::default();
        let board = HealthBoard::new();
        let (orch, bus, events) = orchestrator(&cfg, vec![], 2);
        let orch = orch.with_health_board(board.clone());
        let machine = orch.machine();
        let rx = events.subscribe();

        // the Unresponsive transition is pushed out of the ring before it is read
        board.set(&Arc::from("motor-1"), HealthState::Unresponsive);
        events.publish(changed("motor-1", HealthState::Healthy, HealthState::Unresponsive));
        for _ in 0..4 {
            events.publish(MonitorEvent::new(EventKind::ShutdownRequested));
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(orch.run(rx, token.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(machine.lock().pending_restart("motor-1").is_some());
        assert_eq!(machine.lock().restarts_issued("motor-1"), 1);
        assert_eq!(bus.topic_stats("control.motor-1").unwrap().published, 1);

        token.cancel();
        task.await.unwrap();
    }
}
