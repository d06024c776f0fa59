//! # Telemetry collector: the single writer of subsystem records.
//!
//! The collector follows every topic on the shared bus and folds each
//! envelope into the record of its sender.
//!
//! ## Architecture
//! ```text
//!   SharedBus ── generation() changed? ──► subscribe new topics
//!       │
//!       ├─ telemetry.<id> ──► open (cipher) ──► TelemetryPayload ──┐
//!       ├─ other data     ──► transit latency ─────────────────────┼─► Tracker(sender_id)
//!       └─ control.<id>   ──► sequence accounting only ────────────┘        │
//!                                                                            ▼
//!   EventBus ── StateChanged ──► health mirror                     SubsystemRecord (copy)
//!                                                                   snapshot / snapshot_all
//! ```
//!
//! ## Rules
//! - **Single writer**: only the collector mutates records; readers get clones.
//! - **Malformed payloads** become error samples and are never propagated.
//! - **Latency sample**: self-reported `latency_us` when present, else transit latency.
//! - **Wake-ups**: bus activity, collector tick (backstop) or a monitor event.
//! - **Lag**: a collector that fell behind the event stream copies the health
//!   mirror from the detector's [`HealthBoard`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bus::{Poll, SharedBus, Subscription};
use crate::detector::HealthBoard;
use crate::envelope::{CONTROL_PREFIX, Envelope, PayloadKind, TELEMETRY_PREFIX, TelemetryPayload};
use crate::error::MonitorError;
use crate::events::{EventKind, MonitorEvent};
use crate::security::PayloadCipher;

use super::record::{Observation, SubsystemRecord, Tracker};

/// Envelopes taken from one subscription per pass before yielding.
const DRAIN_BUDGET: usize = 256;

struct Inner {
    records: RwLock<HashMap<Arc<str>, Tracker>>,
    window: usize,
    cipher: Arc<dyn PayloadCipher>,
}

/// Derives per-subsystem health metrics from bus traffic.
///
/// Cheap to clone; all clones share the same records.
#[derive(Clone)]
pub struct TelemetryCollector {
    inner: Arc<Inner>,
}

impl TelemetryCollector {
    /// Creates a collector with a sliding window of `window` samples.
    pub fn new(window: usize, cipher: Arc<dyn PayloadCipher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                records: RwLock::new(HashMap::new()),
                window,
                cipher,
            }),
        }
    }

    /// Copy of one subsystem record.
    pub fn snapshot(&self, id: &str) -> Result<SubsystemRecord, MonitorError> {
        self.inner
            .records
            .read()
            .get(id)
            .map(|t| t.record().clone())
            .ok_or_else(|| unknown(id))
    }

    /// Copies of every record, sorted by subsystem id.
    pub fn snapshot_all(&self) -> Vec<SubsystemRecord> {
        let mut all: Vec<SubsystemRecord> = self
            .inner
            .records
            .read()
            .values()
            .map(|t| t.record().clone())
            .collect();
        all.sort_unstable_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Time since the subsystem was last observed.
    pub fn missing_since(&self, id: &str) -> Result<Duration, MonitorError> {
        let now = Instant::now();
        self.inner
            .records
            .read()
            .get(id)
            .map(|t| t.record().missing_since(now))
            .ok_or_else(|| unknown(id))
    }

    /// True once the subsystem has been observed.
    pub fn knows(&self, id: &str) -> bool {
        self.inner.records.read().contains_key(id)
    }

    /// Folds one envelope into its sender's record.
    pub fn ingest(&self, env: &Envelope, received_at: Instant) {
        if env.topic.starts_with(CONTROL_PREFIX) {
            if let Some(t) = self.inner.records.write().get_mut(env.sender_id.as_ref()) {
                t.count_sequence(env.sequence);
            }
            return;
        }

        let obs = self.decode(env, received_at);
        let mut records = self.inner.records.write();
        records
            .entry(Arc::clone(&env.sender_id))
            .or_insert_with(|| Tracker::new(Arc::clone(&env.sender_id), self.inner.window, obs.at))
            .observe(obs);
    }

    /// Applies a detector transition to the health mirror.
    pub fn apply(&self, ev: &MonitorEvent) {
        if ev.kind != EventKind::StateChanged {
            return;
        }
        let (Some(id), Some(to)) = (ev.subsystem.as_deref(), ev.to) else {
            return;
        };
        if let Some(t) = self.inner.records.write().get_mut(id) {
            t.set_health(to);
        }
    }

    /// Copies every decided state on the board into the health mirror.
    pub fn mirror(&self, board: &HealthBoard) {
        let states = board.snapshot();
        let mut records = self.inner.records.write();
        for (id, state) in states {
            if let Some(t) = records.get_mut(id.as_ref()) {
                t.set_health(state);
            }
        }
    }

    /// Runs the collection loop until `token` is cancelled.
    pub async fn run(
        self,
        bus: SharedBus,
        mut events: broadcast::Receiver<MonitorEvent>,
        board: HealthBoard,
        tick: Duration,
        token: CancellationToken,
    ) {
        let mut subs: HashMap<String, Subscription> = HashMap::new();
        let mut seen_generation = None;
        let mut events_open = true;

        loop {
            let notified = bus.activity().notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let generation = bus.generation();
            if seen_generation != Some(generation) {
                self.follow_topics(&bus, &mut subs);
                seen_generation = Some(generation);
            }
            if self.drain(&subs) {
                tokio::task::yield_now().await;
                if token.is_cancelled() {
                    break;
                }
                continue;
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = &mut notified => {}
                _ = tokio::time::sleep(tick) => {}
                ev = events.recv(), if events_open => match ev {
                    Ok(ev) => self.apply(&ev),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "collector lagged behind monitor events");
                        self.mirror(&board);
                    }
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
            }
        }
        debug!(topics = subs.len(), "collector stopped");
    }

    fn follow_topics(&self, bus: &SharedBus, subs: &mut HashMap<String, Subscription>) {
        for name in bus.topics() {
            if subs.contains_key(&name) {
                continue;
            }
            match bus.subscribe(&name) {
                Ok(sub) => {
                    debug!(topic = %name, "collector following topic");
                    subs.insert(name, sub);
                }
                Err(e) => warn!(topic = %name, error = e.as_label(), "collector cannot follow topic"),
            }
        }
    }

    /// Drains every subscription; returns true when a budget was exhausted.
    fn drain(&self, subs: &HashMap<String, Subscription>) -> bool {
        let mut more = false;
        for sub in subs.values() {
            let mut taken = 0;
            while taken < DRAIN_BUDGET {
                match sub.poll() {
                    Poll::Ready(env) => self.ingest(&env, Instant::now()),
                    Poll::NoData => break,
                }
                taken += 1;
            }
            more |= taken == DRAIN_BUDGET;
        }
        more
    }

    fn decode(&self, env: &Envelope, received_at: Instant) -> Observation {
        let at = env.timestamp.min(received_at);
        let transit = received_at.saturating_duration_since(env.timestamp);
        let mut obs = Observation {
            sequence: env.sequence,
            at,
            latency: transit,
            error: env.is_error(),
            error_code: None,
            metrics: None,
        };

        let is_report = matches!(env.payload_kind, PayloadKind::Status | PayloadKind::Error);
        if !is_report || !env.topic.starts_with(TELEMETRY_PREFIX) {
            return obs;
        }

        let decoded = self
            .inner
            .cipher
            .open(&env.payload, &env.associated_data())
            .map_err(|e| e.as_label())
            .and_then(|plain| TelemetryPayload::from_bytes(&plain).map_err(|_| "telemetry_malformed"));

        match decoded {
            Ok(payload) => {
                if let Some(us) = payload.latency_us {
                    obs.latency = Duration::from_micros(us);
                }
                obs.error |= payload.error_code.is_some();
                obs.error_code = payload.error_code;
                if !payload.metrics.is_null() {
                    obs.metrics = Some(payload.metrics);
                }
            }
            Err(label) => {
                debug!(topic = %env.topic, sender = %env.sender_id, seq = env.sequence, error = label, "undecodable telemetry");
                obs.error = true;
                obs.error_code = Some(label.to_string());
            }
        }
        obs
    }
}

fn unknown(id: &str) -> MonitorError {
    MonitorError::UnknownSubsystem {
        subsystem: id.to_string(),
    }
}

impl std::fmt::Debug for TelemetryCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryCollector")
            .field("subsystems", &self.inner.records.read().len())
            .field("window", &self.inner.window)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TopicConfig;
    use crate::detector::HealthState;
    use crate::events::EventBus;
    use crate::security::Plaintext;

    fn collector() -> TelemetryCollector {
        TelemetryCollector::new(8, Arc::new(Plaintext))
    }

    fn status(seq: u64, payload: &[u8]) -> Envelope {
        Envelope::new("telemetry.motor-1", "motor-1", seq, PayloadKind::Status, payload.to_vec())
    }

    #[test]
    fn unknown_before_first_observation() {
        let c = collector();
        assert!(matches!(
            c.snapshot("motor-1"),
            Err(MonitorError::UnknownSubsystem { .. })
        ));
        assert!(c.missing_since("motor-1").is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn self_reported_latency_wins_over_transit() {
        let c = collector();
        let body = TelemetryPayload::default().latency_us(40_000).to_bytes().unwrap();
        let env = status(1, &body);
        c.ingest(&env, env.timestamp + Duration::from_millis(3));

        let r = c.snapshot("motor-1").unwrap();
        assert_eq!(r.mean_latency, Duration::from_millis(40));
        assert_eq!(r.error_count, 0);

        let env = Envelope::new("vision.frames", "motor-1", 2, PayloadKind::Data, Vec::new());
        c.ingest(&env, env.timestamp + Duration::from_millis(10));
        assert_eq!(c.snapshot("motor-1").unwrap().mean_latency, Duration::from_millis(25));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_payload_is_an_error_sample() {
        let c = collector();
        let env = status(1, b"{not json");
        c.ingest(&env, env.timestamp);
        let r = c.snapshot("motor-1").unwrap();
        assert_eq!(r.error_count, 1);
        assert_eq!(r.last_error_code.as_deref(), Some("telemetry_malformed"));

        // empty payload is a valid report
        let env = status(2, b"");
        c.ingest(&env, env.timestamp);
        assert_eq!(c.snapshot("motor-1").unwrap().error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn control_topics_only_account_sequences() {
        let c = collector();
        let env = Envelope::new("control.motor-1", "ai", 1, PayloadKind::Command, Vec::new());
        c.ingest(&env, env.timestamp);
        assert!(!c.knows("ai"));
    }

    #[tokio::test(start_paused = true)]
    async fn health_mirror_follows_state_changes() {
        let c = collector();
        let env = status(1, b"");
        c.ingest(&env, env.timestamp);
        c.apply(
            &MonitorEvent::new(EventKind::StateChanged)
                .with_subsystem("motor-1")
                .with_transition(HealthState::Healthy, HealthState::Degraded),
        );
        assert_eq!(c.snapshot("motor-1").unwrap().health, HealthState::Degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn run_follows_late_topics() {
        let bus = SharedBus::new();
        let events = EventBus::new(16);
        let c = collector();
        let token = CancellationToken::new();
        let handle = tokio::spawn(c.clone().run(
            bus.clone(),
            events.subscribe(),
            HealthBoard::new(),
            Duration::from_millis(25),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_millis(10)).await;
        bus.create_topic("telemetry.lidar", TopicConfig::new(8)).unwrap();
        bus.publisher("lidar")
            .send("telemetry.lidar", PayloadKind::Heartbeat, Vec::new())
            .unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(c.snapshot("lidar").unwrap().samples, 1);
        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn lagging_collector_copies_health_from_the_board() {
        let bus = SharedBus::new();
        let events = EventBus::new(2);
        let board = HealthBoard::new();
        let c = collector();
        let env = status(1, b"");
        c.ingest(&env, env.timestamp);

        let rx = events.subscribe();
        board.set(&Arc::from("motor-1"), HealthState::Unresponsive);
        events.publish(
            MonitorEvent::new(EventKind::StateChanged)
                .with_subsystem("motor-1")
                .with_transition(HealthState::Healthy, HealthState::Unresponsive),
        );
        for _ in 0..4 {
            events.publish(MonitorEvent::new(EventKind::ShutdownRequested));
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(c.clone().run(
            bus,
            rx,
            board,
            Duration::from_millis(25),
            token.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(c.snapshot("motor-1").unwrap().health, HealthState::Unresponsive);
        token.cancel();
        handle.await.unwrap();
    }
}
