//! # Anomaly detector task.
//!
//! Wraps a [`HealthClassifier`] in a periodic loop: every
//! `evaluation_interval` it takes fresh snapshots from the collector and
//! publishes the resulting transitions as `StateChanged` events. Between
//! ticks it listens for orchestrator announcements (`ActionIssued`) and
//! operator acknowledgements.
//!
//! Every decided state is written to the [`HealthBoard`] before its event is
//! published. When the detector lags behind the event stream it reconciles
//! with the recovery machine, since the dropped events may have been
//! Restart or Isolate announcements.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{EventBus, EventKind, MonitorEvent};
use crate::recovery::RecoveryMachine;
use crate::telemetry::TelemetryCollector;

use super::board::HealthBoard;
use super::classifier::{HealthClassifier, Transition};
use super::health::HealthState;

/// Periodic health evaluator.
pub struct AnomalyDetector {
    classifier: HealthClassifier,
    collector: TelemetryCollector,
    events: EventBus,
    interval: Duration,
    board: HealthBoard,
    recovery: Option<Arc<Mutex<RecoveryMachine>>>,
}

impl AnomalyDetector {
    pub fn new(
        classifier: HealthClassifier,
        collector: TelemetryCollector,
        events: EventBus,
        interval: Duration,
    ) -> Self {
        Self {
            classifier,
            collector,
            events,
            interval,
            board: HealthBoard::new(),
            recovery: None,
        }
    }

    /// Publishes decided states on `board` instead of a private one.
    pub fn with_board(mut self, board: HealthBoard) -> Self {
        self.board = board;
        self
    }

    /// Recovery machine consulted after the detector lagged.
    pub fn with_recovery(mut self, machine: Arc<Mutex<RecoveryMachine>>) -> Self {
        self.recovery = Some(machine);
        self
    }

    /// Board holding the decided states.
    pub fn board(&self) -> &HealthBoard {
        &self.board
    }

    /// Runs evaluation passes until `token` is cancelled.
    pub async fn run(mut self, mut rx: broadcast::Receiver<MonitorEvent>, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate_once(Instant::now());
                }
                ev = rx.recv(), if events_open => match ev {
                    Ok(ev) => self.on_event(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "detector lagged behind monitor events");
                        self.resync(Instant::now());
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        }
        debug!("detector stopped");
    }

    /// One evaluation pass; returns the number of transitions emitted.
    pub fn evaluate_once(&mut self, now: Instant) -> usize {
        let snapshots = self.collector.snapshot_all();
        let transitions = self.classifier.evaluate(&snapshots, now);
        let n = transitions.len();
        for t in transitions {
            self.emit(t);
        }
        n
    }

    /// Decided state of a subsystem.
    pub fn state(&self, id: &str) -> Option<HealthState> {
        self.classifier.state(id)
    }

    fn on_event(&mut self, ev: &MonitorEvent) {
        let Some(id) = ev.subsystem.as_deref() else {
            return;
        };
        let now = Instant::now();
        let transition = match (ev.kind, ev.action) {
            (EventKind::ActionIssued, Some(kind)) => self.classifier.on_action_issued(id, kind, now),
            (EventKind::Acknowledged, _) => self.classifier.acknowledge(id, now),
            _ => None,
        };
        if let Some(t) = transition {
            self.emit(t);
        }
    }

    /// Applies Restart and Isolate decisions the event stream failed to deliver.
    ///
    /// Returns the number of transitions emitted.
    pub fn resync(&mut self, now: Instant) -> usize {
        let Some(machine) = &self.recovery else {
            return 0;
        };
        let statuses = machine.lock().statuses();
        let mut n = 0;
        for (id, status) in statuses {
            if let Some(t) = self
                .classifier
                .reconcile(&id, status.restart_pending, status.isolated, now)
            {
                self.emit(t);
                n += 1;
            }
        }
        n
    }

    fn emit(&self, t: Transition) {
        self.board.set(&t.subsystem, t.to);
        match t.to {
            HealthState::Healthy | HealthState::Recovering => {
                info!(subsystem = %t.subsystem, from = %t.from, to = %t.to, reason = %t.reason, "health state changed");
            }
            _ => {
                warn!(subsystem = %t.subsystem, from = %t.from, to = %t.to, reason = %t.reason, "health state changed");
            }
        }
        self.events.publish(t.into_event());
    }
}
