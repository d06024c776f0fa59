//! # Health report.
//!
//! A serializable point-in-time summary of the monitor: per-subsystem health
//! and telemetry figures, detected faults, issued restarts and the alerts an
//! operator still has to acknowledge.
//!
//! ```text
//! {
//!   "uptime": "12s 500ms",
//!   "subsystems": [{ "id": "motor-1", "state": "healthy", ... }],
//!   "faults_detected": 1,
//!   "restarts_issued": 1,
//!   "unacknowledged_alerts": []
//! }
//! ```

use std::time::Duration;

use serde::Serialize;

use crate::detector::HealthState;
use crate::recovery::Alert;

/// Health of one subsystem as seen by the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsystemReport {
    pub id: String,
    pub state: HealthState,
    pub isolated: bool,
    pub samples: u64,
    pub error_count: u64,
    pub error_rate: f64,
    #[serde(with = "humantime_serde")]
    pub mean_latency: Duration,
    #[serde(with = "humantime_serde")]
    pub max_latency: Duration,
    /// Time since the last envelope from this subsystem.
    #[serde(with = "humantime_serde")]
    pub silent_for: Duration,
    pub sequence_gaps: u64,
    pub faults: u64,
    pub restarts: usize,
}

/// Monitor-wide summary returned by [`Monitor::report`](crate::Monitor::report).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    #[serde(with = "humantime_serde")]
    pub uptime: Duration,
    pub subsystems: Vec<SubsystemReport>,
    pub faults_detected: u64,
    pub restarts_issued: usize,
    pub unacknowledged_alerts: Vec<Alert>,
}

impl HealthReport {
    /// True when every subsystem is `Healthy` and no alert awaits acknowledgment.
    pub fn all_healthy(&self) -> bool {
        self.unacknowledged_alerts.is_empty()
            && self
                .subsystems
                .iter()
                .all(|s| s.state == HealthState::Healthy)
    }

    /// Report entry for one subsystem.
    pub fn subsystem(&self, id: &str) -> Option<&SubsystemReport> {
        self.subsystems.iter().find(|s| s.id == id)
    }
}
