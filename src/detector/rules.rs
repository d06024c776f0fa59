//! # Classification rules.
//!
//! Ordered, first match wins:
//! 1. `missing_since > liveness_timeout` → `Unresponsive`
//! 2. mean latency > `latency_threshold` or error rate > `error_rate_threshold` → `Degraded`
//! 3. otherwise → `Healthy`
//!
//! The error rate is only trusted once the window holds `error_min_samples`.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::MonitorConfig;
use crate::telemetry::SubsystemRecord;

use super::health::HealthState;

/// Thresholds used by [`classify`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub liveness_timeout: Duration,
    pub latency_threshold: Duration,
    pub error_rate_threshold: f64,
    pub error_min_samples: usize,
}

impl From<&MonitorConfig> for Thresholds {
    fn from(cfg: &MonitorConfig) -> Self {
        Self {
            liveness_timeout: cfg.liveness_timeout,
            latency_threshold: cfg.latency_threshold,
            error_rate_threshold: cfg.error_rate_threshold,
            error_min_samples: cfg.error_min_samples,
        }
    }
}

/// Raw classification of one snapshot with the rule that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub state: HealthState,
    pub reason: String,
}

/// Applies the ordered rules to one snapshot.
pub fn classify(record: &SubsystemRecord, now: Instant, t: &Thresholds) -> Verdict {
    let silent = record.missing_since(now);
    if silent > t.liveness_timeout {
        return Verdict {
            state: HealthState::Unresponsive,
            reason: format!("silent for {silent:?} (liveness timeout {:?})", t.liveness_timeout),
        };
    }
    if record.window_len > 0 && record.mean_latency > t.latency_threshold {
        return Verdict {
            state: HealthState::Degraded,
            reason: format!(
                "mean latency {:?} above {:?}",
                record.mean_latency, t.latency_threshold
            ),
        };
    }
    if record.window_len >= t.error_min_samples.max(1) && record.error_rate > t.error_rate_threshold {
        return Verdict {
            state: HealthState::Degraded,
            reason: format!(
                "error rate {:.2} above {:.2}",
                record.error_rate, t.error_rate_threshold
            ),
        };
    }
    Verdict {
        state: HealthState::Healthy,
        reason: "within thresholds".to_string(),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;

    pub(crate) fn record(id: &str, last_seen: Instant) -> SubsystemRecord {
        SubsystemRecord {
            id: Arc::from(id),
            first_seen: last_seen,
            last_seen,
            samples: 10,
            error_count: 0,
            mean_latency: Duration::from_millis(1),
            max_latency: Duration::from_millis(1),
            window_len: 10,
            error_rate: 0.0,
            sequence_gaps: 0,
            last_sequence: 10,
            last_error_code: None,
            last_metrics: None,
            health: HealthState::Healthy,
        }
    }

    fn thresholds() -> Thresholds {
        Thresholds::from(&MonitorConfig::default())
    }

    #[test]
    fn silence_beats_every_other_rule() {
        let now = Instant::now();
        let mut r = record("motor-1", now);
        r.mean_latency = Duration::from_secs(1);
        r.error_rate = 1.0;
        let v = classify(&r, now + Duration::from_millis(301), &thresholds());
        assert_eq!(v.state, HealthState::Unresponsive);

        let v = classify(&r, now + Duration::from_millis(300), &thresholds());
        assert_eq!(v.state, HealthState::Degraded);
    }

    #[test]
    fn error_rate_needs_enough_samples() {
        let now = Instant::now();
        let mut r = record("arm", now);
        r.error_rate = 0.5;
        r.window_len = 3;
        assert_eq!(classify(&r, now, &thresholds()).state, HealthState::Healthy);
        r.window_len = 4;
        let v = classify(&r, now, &thresholds());
        assert_eq!(v.state, HealthState::Degraded);
        assert!(v.reason.starts_with("error rate"));
    }
}
