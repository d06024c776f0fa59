//! # External alerting.
//!
//! [`AlertSink`] is the escalation seam: the orchestrator calls
//! `notify(subsystem, severity, reason)` for every terminal recovery failure
//! (`Critical`) and for restarts it could not deliver (`Warning`).
//! [`AlertLog`] is the built-in sink; it keeps alerts until an operator
//! acknowledges the subsystem and backs the health report. Acknowledged
//! alerts beyond its limit are dropped, oldest first.
//!
//! ## Example
//! ```rust
//! use healbus::{AlertLog, AlertSink, Severity};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let log = AlertLog::new();
//! log.notify("motor-1", Severity::Critical, "restart budget exhausted").await.unwrap();
//! assert_eq!(log.pending().len(), 1);
//!
//! log.acknowledge("motor-1");
//! assert!(log.pending().is_empty());
//! # }
//! ```

use std::collections::VecDeque;
use std::time::SystemTime;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::AlertError;

/// Alert urgency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recovery continues, but an operator should look.
    Warning,
    /// Automatic recovery gave up; the subsystem is isolated.
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

/// One alert raised for one subsystem.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub subsystem: String,
    pub severity: Severity,
    pub reason: String,
    pub raised_at: SystemTime,
    pub acknowledged: bool,
}

/// Receiver of escalations.
///
/// Each alert is delivered on its own task, so a slow sink delays only the
/// outcome of its `Escalate` action.
#[async_trait]
pub trait AlertSink: Send + Sync + 'static {
    /// Delivers one alert.
    async fn notify(&self, subsystem: &str, severity: Severity, reason: &str) -> Result<(), AlertError>;

    /// Human-readable name (for logs).
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Acknowledged alerts an [`AlertLog`] keeps by default.
const DEFAULT_LIMIT: usize = 256;

/// In-memory sink that accumulates alerts until acknowledged.
///
/// Unacknowledged alerts are always kept.
#[derive(Debug)]
pub struct AlertLog {
    alerts: Mutex<VecDeque<Alert>>,
    limit: usize,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::with_limit(DEFAULT_LIMIT)
    }
}

impl AlertLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty log keeping at most `limit` acknowledged alerts.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            alerts: Mutex::new(VecDeque::new()),
            limit,
        }
    }

    /// Every retained alert, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().iter().cloned().collect()
    }

    /// Alerts not yet acknowledged.
    pub fn pending(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .iter()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Acknowledges all alerts of `subsystem`; returns how many changed.
    pub fn acknowledge(&self, subsystem: &str) -> usize {
        let mut alerts = self.alerts.lock();
        let mut n = 0;
        for alert in alerts
            .iter_mut()
            .filter(|a| a.subsystem == subsystem && !a.acknowledged)
        {
            alert.acknowledged = true;
            n += 1;
        }
        let mut acknowledged = alerts.iter().filter(|a| a.acknowledged).count();
        if acknowledged > self.limit {
            alerts.retain(|a| {
                if a.acknowledged && acknowledged > self.limit {
                    acknowledged -= 1;
                    return false;
                }
                true
            });
        }
        n
    }
}

#[async_trait]
impl AlertSink for AlertLog {
    async fn notify(&self, subsystem: &str, severity: Severity, reason: &str) -> Result<(), AlertError> {
        self.alerts.lock().push_back(Alert {
            subsystem: subsystem.to_string(),
            severity,
            reason: reason.to_string(),
            raised_at: SystemTime::now(),
            acknowledged: false,
        });
        Ok(())
    }

    fn name(&self) -> &'static str {
        "alert_log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acknowledge_is_per_subsystem() {
        let log = AlertLog::new();
        log.notify("motor-1", Severity::Critical, "isolated").await.unwrap();
        log.notify("lidar", Severity::Warning, "throttled").await.unwrap();
        log.notify("motor-1", Severity::Warning, "again").await.unwrap();

        assert_eq!(log.acknowledge("motor-1"), 2);
        assert_eq!(log.acknowledge("motor-1"), 0);

        let pending = log.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subsystem, "lidar");
        assert_eq!(log.alerts().len(), 3);
    }

    #[test]
    fn severities_order_by_urgency() {
        assert!(Severity::Critical > Severity::Warning);
        assert_eq!(Severity::Warning.as_str(), "warning");
    }

    #[tokio::test]
    async fn old_acknowledged_alerts_are_dropped_first() {
        let log = AlertLog::with_limit(1);
        log.notify("motor-1", Severity::Critical, "first").await.unwrap();
        log.notify("motor-1", Severity::Critical, "second").await.unwrap();
        log.notify("lidar", Severity::Warning, "unreachable").await.unwrap();
        assert_eq!(log.acknowledge("motor-1"), 2);

        let reasons: Vec<String> = log.alerts().into_iter().map(|a| a.reason).collect();
        assert_eq!(reasons, vec!["second", "unreachable"]);
        assert_eq!(log.pending().len(), 1);
    }
}
