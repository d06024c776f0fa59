use serde::{Deserialize, Serialize};

/// Health classification of one subsystem.
///
/// Decided only by the anomaly detector; every other component mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Within every threshold.
    #[default]
    Healthy,
    /// Alive but slow or erroring.
    Degraded,
    /// Silent for longer than the liveness timeout.
    Unresponsive,
    /// Restarted; waiting for sustained healthy telemetry.
    Recovering,
    /// Out of automatic recovery until acknowledged.
    Failed,
}

impl HealthState {
    /// Short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::Degraded => "degraded",
            HealthState::Unresponsive => "unresponsive",
            HealthState::Recovering => "recovering",
            HealthState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
