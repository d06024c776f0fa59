//! # Per-subsystem telemetry record.
//!
//! [`SubsystemRecord`] is the point-in-time view handed to readers. The
//! collector keeps the mutable side (sliding window, sequence accounting) in
//! a private tracker and refreshes the record after every observation, so a
//! snapshot is a plain clone taken under a short read lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::detector::HealthState;

use super::window::LatencyWindow;

/// Telemetry-derived state of one subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct SubsystemRecord {
    /// Subsystem id (envelope `sender_id`).
    pub id: Arc<str>,
    /// First observation.
    pub first_seen: Instant,
    /// Latest observation.
    pub last_seen: Instant,
    /// Envelopes observed in total.
    pub samples: u64,
    /// Error samples observed in total.
    pub error_count: u64,
    /// Mean latency over the sliding window.
    pub mean_latency: Duration,
    /// Largest latency in the sliding window.
    pub max_latency: Duration,
    /// Samples currently in the sliding window.
    pub window_len: usize,
    /// Fraction of error samples in the sliding window.
    pub error_rate: f64,
    /// Envelopes known to be lost (sequence gaps).
    pub sequence_gaps: u64,
    /// Highest sequence number observed.
    pub last_sequence: u64,
    /// Most recent error code reported by the subsystem.
    pub last_error_code: Option<String>,
    /// Most recent decoded metrics document.
    pub last_metrics: Option<serde_json::Value>,
    /// Health state as last decided by the detector.
    pub health: HealthState,
}

impl SubsystemRecord {
    /// Time since the last observation.
    #[inline]
    pub fn missing_since(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// One decoded observation.
#[derive(Debug)]
pub(crate) struct Observation {
    pub sequence: u64,
    pub at: Instant,
    pub latency: Duration,
    pub error: bool,
    pub error_code: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

/// Mutable collector-side state behind one record.
#[derive(Debug)]
pub(crate) struct Tracker {
    record: SubsystemRecord,
    window: LatencyWindow,
    first_seq: u64,
    received: u64,
}

impl Tracker {
    pub fn new(id: Arc<str>, window: usize, at: Instant) -> Self {
        Self {
            record: SubsystemRecord {
                id,
                first_seen: at,
                last_seen: at,
                samples: 0,
                error_count: 0,
                mean_latency: Duration::ZERO,
                max_latency: Duration::ZERO,
                window_len: 0,
                error_rate: 0.0,
                sequence_gaps: 0,
                last_sequence: 0,
                last_error_code: None,
                last_metrics: None,
                health: HealthState::Healthy,
            },
            window: LatencyWindow::new(window),
            first_seq: 0,
            received: 0,
        }
    }

    pub fn observe(&mut self, obs: Observation) {
        self.count_sequence(obs.sequence);

        let r = &mut self.record;
        if obs.at > r.last_seen {
            r.last_seen = obs.at;
        }
        r.samples += 1;
        if obs.error {
            r.error_count += 1;
        }
        if obs.error_code.is_some() {
            r.last_error_code = obs.error_code;
        }
        if obs.metrics.is_some() {
            r.last_metrics = obs.metrics;
        }

        self.window.push(obs.latency, obs.error);
        r.mean_latency = self.window.mean();
        r.max_latency = self.window.max();
        r.window_len = self.window.len();
        r.error_rate = self.window.error_rate();
    }

    /// Accounts a sequence number without a latency sample or liveness update.
    ///
    /// Loss is `span - received`, which does not depend on the order in
    /// which the sender's topics are drained.
    pub fn count_sequence(&mut self, sequence: u64) {
        if self.received == 0 || sequence < self.first_seq {
            self.first_seq = sequence;
        }
        self.received += 1;

        let r = &mut self.record;
        r.last_sequence = r.last_sequence.max(sequence);
        let span = r.last_sequence.saturating_sub(self.first_seq) + 1;
        r.sequence_gaps = span.saturating_sub(self.received);
    }

    pub fn set_health(&mut self, health: HealthState) {
        self.record.health = health;
    }

    pub fn record(&self) -> &SubsystemRecord {
        &self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(seq: u64, at: Instant) -> Observation {
        Observation {
            sequence: seq,
            at,
            latency: Duration::from_millis(2),
            error: false,
            error_code: None,
            metrics: None,
        }
    }

    #[test]
    fn gaps_are_order_independent() {
        let t0 = Instant::now();
        let mut t = Tracker::new(Arc::from("arm"), 8, t0);
        t.observe(obs(3, t0));
        t.observe(obs(1, t0));
        assert_eq!(t.record().sequence_gaps, 1);
        t.count_sequence(2);
        assert_eq!(t.record().sequence_gaps, 0);
        t.observe(obs(6, t0));
        assert_eq!(t.record().sequence_gaps, 2);
        assert_eq!(t.record().last_sequence, 6);
        assert_eq!(t.record().samples, 3);
    }

    #[test]
    fn errors_and_codes_are_kept() {
        let t0 = Instant::now();
        let mut t = Tracker::new(Arc::from("arm"), 2, t0);
        t.observe(Observation {
            error: true,
            error_code: Some("E_STALL".into()),
            ..obs(1, t0)
        });
        t.observe(obs(2, t0 + Duration::from_millis(5)));
        let r = t.record();
        assert_eq!(r.error_count, 1);
        assert_eq!(r.error_rate, 0.5);
        assert_eq!(r.last_error_code.as_deref(), Some("E_STALL"));
        assert_eq!(r.missing_since(t0 + Duration::from_millis(15)), Duration::from_millis(10));
    }
}
