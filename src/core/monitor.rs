//! # Monitor: wires the collector, detector and orchestrator around one bus.
//!
//! The [`Monitor`] owns the shared bus handle, the monitor event stream, the
//! [`SubscriberSet`] and the state the components share (telemetry records,
//! recovery history, alert log). It spawns one task per component and performs
//! graceful shutdown within [`MonitorConfig::grace`].
//!
//! ## High-level architecture
//! ```text
//! Preparation (run):
//!   - subscriber_listener(): EventBus.subscribe() ─► FaultLedger + SubscriberSet::emit
//!   - collector / detector / orchestrator receivers subscribed before any spawn
//!
//! Spawn components (child CancellationToken each):
//!   TelemetryCollector::run ── polls every topic ──► SubsystemRecord
//!   AnomalyDetector::run    ── evaluates records ──► StateChanged
//!   Orchestrator::run       ── StateChanged      ──► control.<id> / AlertSink
//!
//! Shutdown path:
//!   token.cancelled()
//!        └─► EventBus.publish(ShutdownRequested)
//!        └─► wait_all_with_grace(cfg.grace):
//!               ├─ Ok (all joined)  → EventBus.publish(AllStoppedWithin)
//!               └─ Timeout exceeded → EventBus.publish(GraceExceeded)
//!                                     RuntimeError::GraceExceeded { stuck }
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use healbus::{Monitor, MonitorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Monitor::builder(MonitorConfig::default()).build()?;
//!     monitor.register_subsystem("motor-1")?;
//!
//!     let token = CancellationToken::new();
//!     let stop = token.clone();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_millis(100)).await;
//!         stop.cancel();
//!     });
//!
//!     monitor.run(token).await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bus::SharedBus;
use crate::config::MonitorConfig;
use crate::core::{ledger::FaultLedger, shutdown};
use crate::detector::{AnomalyDetector, HealthBoard, HealthClassifier, HealthState};
use crate::envelope::{control_topic, telemetry_topic};
use crate::error::{BusError, MonitorError, RuntimeError};
use crate::events::{EventBus, EventKind, MonitorEvent};
use crate::recovery::{
    Alert, AlertLog, AlertSink, Orchestrator, RecoveryAction, RecoveryMachine,
};
use crate::security::{PayloadCipher, SealedBus};
use crate::subscribers::SubscriberSet;
use crate::telemetry::{SubsystemRecord, TelemetryCollector};

use super::builder::MonitorBuilder;
use super::report::{HealthReport, SubsystemReport};

/// Self-healing health monitor over a [`SharedBus`].
pub struct Monitor {
    cfg: MonitorConfig,
    bus: SharedBus,
    events: EventBus,
    cipher: Arc<dyn PayloadCipher>,
    collector: TelemetryCollector,
    machine: Arc<Mutex<RecoveryMachine>>,
    alerts: Arc<AlertLog>,
    sinks: Vec<Arc<dyn AlertSink>>,
    subs: Arc<SubscriberSet>,
    ledger: Arc<FaultLedger>,
    started_at: Instant,
    running: AtomicBool,
}

impl Monitor {
    /// Starts building a monitor with the given configuration.
    pub fn builder(cfg: MonitorConfig) -> MonitorBuilder {
        MonitorBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn new_internal(
        cfg: MonitorConfig,
        bus: SharedBus,
        events: EventBus,
        cipher: Arc<dyn PayloadCipher>,
        machine: RecoveryMachine,
        alerts: Arc<AlertLog>,
        sinks: Vec<Arc<dyn AlertSink>>,
        subs: Arc<SubscriberSet>,
    ) -> Self {
        let collector = TelemetryCollector::new(cfg.latency_window, Arc::clone(&cipher));
        Self {
            cfg,
            bus,
            events,
            cipher,
            collector,
            machine: Arc::new(Mutex::new(machine)),
            alerts,
            sinks,
            subs,
            ledger: Arc::new(FaultLedger::new()),
            started_at: Instant::now(),
            running: AtomicBool::new(false),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.cfg
    }

    /// The bus the monitor observes. Subsystems publish and poll through it.
    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    /// The bus behind the monitor's payload cipher, for subsystems that share
    /// its trust domain.
    pub fn sealed_bus(&self) -> SealedBus {
        SealedBus::new(self.bus.clone(), Arc::clone(&self.cipher))
    }

    /// The monitor event stream.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers `telemetry.<id>` (monitor topic defaults) and `control.<id>`.
    ///
    /// Registration is optional: the collector follows topics created by
    /// anyone, and the orchestrator creates control topics on first use.
    pub fn register_subsystem(&self, id: &str) -> Result<(), BusError> {
        self.bus
            .create_topic(&telemetry_topic(id), self.cfg.topic)?;
        self.bus
            .create_topic(&control_topic(id), self.cfg.control_topic_config())?;
        debug!(subsystem = id, "subsystem registered");
        Ok(())
    }

    /// Runs the monitor until `token` is cancelled, then stops all components
    /// within the grace period.
    pub async fn run(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(RuntimeError::AlreadyRunning);
        }
        let result = self.run_inner(token).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Like [`run`](Self::run), stopping on SIGINT / SIGTERM / Ctrl-C.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        let token = CancellationToken::new();
        let run = self.run(token.clone());
        tokio::pin!(run);

        tokio::select! {
            res = &mut run => return res,
            sig = shutdown::wait_for_shutdown_signal() => {
                if let Err(e) = sig {
                    warn!(error = %e, "signal registration failed; shutting down");
                }
            }
        }
        token.cancel();
        run.await
    }

    async fn run_inner(&self, token: CancellationToken) -> Result<(), RuntimeError> {
        // Every receiver exists before the first component can publish.
        let listener = self.subscriber_listener();
        let collector_rx = self.events.subscribe();
        let detector_rx = self.events.subscribe();
        let orchestrator_rx = self.events.subscribe();

        let mut set = JoinSet::new();
        let mut alive = HashSet::new();
        let board = HealthBoard::new();

        let collector = self.collector.clone();
        let bus = self.bus.clone();
        let tick = self.cfg.collector_tick;
        let child = token.child_token();
        let collector_board = board.clone();
        spawn_component(&mut set, &mut alive, "collector", async move {
            collector
                .run(bus, collector_rx, collector_board, tick, child)
                .await;
        });

        let detector = AnomalyDetector::new(
            HealthClassifier::new(&self.cfg),
            self.collector.clone(),
            self.events.clone(),
            self.cfg.evaluation_interval,
        )
        .with_board(board.clone())
        .with_recovery(Arc::clone(&self.machine));
        let child = token.child_token();
        spawn_component(&mut set, &mut alive, "detector", detector.run(detector_rx, child));

        let orchestrator = Orchestrator::new(
            Arc::clone(&self.machine),
            self.sealed_bus(),
            self.cfg.control_topic_config(),
            self.events.clone(),
            self.sinks.clone(),
        )
        .with_health_board(board);
        let child = token.child_token();
        spawn_component(
            &mut set,
            &mut alive,
            "orchestrator",
            orchestrator.run(orchestrator_rx, child),
        );

        info!(components = set.len(), "monitor started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                Some(res) = set.join_next() => match res {
                    Ok(name) => {
                        alive.remove(name);
                        warn!(component = name, "monitor component exited before shutdown");
                    }
                    Err(e) => error!(error = %e, "monitor component aborted"),
                },
            }
        }

        self.events
            .publish(MonitorEvent::new(EventKind::ShutdownRequested));
        let result = self.wait_all_with_grace(&mut set, &mut alive).await;

        if let Err(e) = listener.await {
            warn!(error = %e, "subscriber listener aborted");
        }
        result
    }

    /// Subscribes to the event stream and forwards events to the ledger and the
    /// subscriber set until the final shutdown event.
    fn subscriber_listener(&self) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        let set = Arc::clone(&self.subs);
        let ledger = Arc::clone(&self.ledger);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        ledger.update(&ev);
                        set.emit(&ev);
                        if matches!(ev.kind, EventKind::AllStoppedWithin | EventKind::GraceExceeded) {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber listener lagged behind monitor events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Waits for all components within the configured grace period.
    async fn wait_all_with_grace(
        &self,
        set: &mut JoinSet<&'static str>,
        alive: &mut HashSet<&'static str>,
    ) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let done = async {
            while let Some(res) = set.join_next().await {
                if let Ok(name) = res {
                    alive.remove(name);
                }
            }
        };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                self.events
                    .publish(MonitorEvent::new(EventKind::AllStoppedWithin));
                info!("monitor stopped");
                Ok(())
            }
            Err(_) => {
                set.abort_all();
                self.events
                    .publish(MonitorEvent::new(EventKind::GraceExceeded));
                let mut stuck: Vec<&'static str> = alive.iter().copied().collect();
                stuck.sort_unstable();
                warn!(?grace, ?stuck, "shutdown grace exceeded");
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }

    /// Operator acknowledgment: clears pending alerts, lifts isolation, resets
    /// the restart budget and moves a `Failed` subsystem back to `Healthy`.
    ///
    /// Returns the number of alerts cleared.
    pub fn acknowledge(&self, id: &str) -> Result<usize, MonitorError> {
        if !self.collector.knows(id) {
            return Err(MonitorError::UnknownSubsystem {
                subsystem: id.to_string(),
            });
        }
        let cleared = self.alerts.acknowledge(id);
        self.events
            .publish(MonitorEvent::new(EventKind::Acknowledged).with_subsystem(id));
        info!(subsystem = id, cleared, "subsystem acknowledged");
        Ok(cleared)
    }

    /// Copy of the telemetry record of one subsystem.
    pub fn snapshot(&self, id: &str) -> Result<SubsystemRecord, MonitorError> {
        self.collector.snapshot(id)
    }

    /// Copies of all telemetry records, sorted by id.
    pub fn snapshot_all(&self) -> Vec<SubsystemRecord> {
        self.collector.snapshot_all()
    }

    /// Time since the subsystem was last heard from.
    pub fn missing_since(&self, id: &str) -> Result<Duration, MonitorError> {
        self.collector.missing_since(id)
    }

    /// Current classification of a subsystem, if it has been observed.
    pub fn state(&self, id: &str) -> Option<HealthState> {
        self.collector.snapshot(id).ok().map(|r| r.health)
    }

    /// Every recovery action taken so far, oldest first.
    pub fn actions(&self) -> Vec<RecoveryAction> {
        self.machine.lock().actions().cloned().collect()
    }

    /// Every alert raised so far, acknowledged or not.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.alerts()
    }

    /// Point-in-time health summary.
    pub fn report(&self) -> HealthReport {
        let now = Instant::now();
        let machine = self.machine.lock();
        let subsystems: Vec<SubsystemReport> = self
            .collector
            .snapshot_all()
            .into_iter()
            .map(|r| SubsystemReport {
                state: r.health,
                isolated: machine.is_isolated(&r.id),
                samples: r.samples,
                error_count: r.error_count,
                error_rate: r.error_rate,
                mean_latency: r.mean_latency,
                max_latency: r.max_latency,
                silent_for: r.missing_since(now),
                sequence_gaps: r.sequence_gaps,
                faults: self.ledger.faults(&r.id),
                restarts: machine.restarts_issued(&r.id),
                id: r.id.to_string(),
            })
            .collect();
        let restarts_issued = machine.restarts_total();
        drop(machine);

        HealthReport {
            uptime: now.saturating_duration_since(self.started_at),
            subsystems,
            faults_detected: self.ledger.total(),
            restarts_issued,
            unacknowledged_alerts: self.alerts.pending(),
        }
    }
}

/// Spawns a named component whose panic is logged rather than propagated.
fn spawn_component<F>(
    set: &mut JoinSet<&'static str>,
    alive: &mut HashSet<&'static str>,
    name: &'static str,
    fut: F,
) where
    F: Future<Output = ()> + Send + 'static,
{
    alive.insert(name);
    set.spawn(async move {
        if let Err(panic) = AssertUnwindSafe(fut).catch_unwind().await {
            let info = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            error!(component = name, info = %info, "monitor component panicked");
        }
        name
    });
}
