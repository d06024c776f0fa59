//! # Monitor configuration.
//!
//! Provides [`MonitorConfig`], the centralized policy knobs of the health
//! monitor. None of the thresholds are hard-coded; the defaults are
//! placeholders sized for a 20 Hz telemetry loop.
//!
//! Config is used in three ways:
//! 1. **Monitor creation**: `Monitor::builder(config)`
//! 2. **Topic defaults**: `config.topic` for telemetry topics the collector creates
//! 3. **Files**: `MonitorConfig::from_file("monitor.toml")`
//!
//! ## Sentinel values
//! - `degraded_patience = 0s` → sustained degradation never triggers a restart
//! - `grace = 0s` → shutdown aborts components immediately
//!
//! ## TOML example
//! ```toml
//! evaluation_interval = "50ms"
//! liveness_timeout = "300ms"
//! latency_threshold = "20ms"
//! max_restarts = 3
//! restart_window = "1h"
//!
//! [topic]
//! capacity = 128
//! overwrite = "overwrite_oldest"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::bus::TopicConfig;
use crate::error::ConfigError;

/// Global configuration for the monitor runtime.
///
/// ## Field semantics
/// - `evaluation_interval`: detector cadence
/// - `liveness_timeout`: silence after which a subsystem is `Unresponsive`
/// - `latency_threshold`, `error_rate_threshold`: `Degraded` triggers
/// - `latency_window`: sliding window size (samples) for latency and error rate
/// - `error_min_samples`: samples needed before the error rate is trusted
/// - `confirmation_window`: sustained healthy time required to leave `Recovering`
/// - `recovery_timeout`: time allowed for a restart to be confirmed
/// - `degraded_patience`: sustained `Degraded` time before a restart (`0s` = never)
/// - `max_restarts` per `restart_window`: restart budget
/// - `throttle_on_degraded`: issue `ThrottleInput` when a subsystem degrades
/// - `delivery_retry`: delay before an undeliverable restart is retried
/// - `history_limit`: finished actions and acknowledged alerts kept for inspection
/// - `event_capacity`: monitor event stream ring size (min 1; clamped)
/// - `topic`: configuration for topics the monitor creates on demand
/// - `control_capacity`: ring size of `control.<id>` topics
/// - `collector_tick`: collector wake-up backstop when the bus is idle
/// - `grace`: shutdown grace period
///
/// ## Notes
/// All fields are public. Prefer the helper accessors to avoid spreading
/// sentinel checks (`0`) across the codebase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Detector evaluation cadence.
    #[serde(with = "humantime_serde")]
    pub evaluation_interval: Duration,

    /// Silence longer than this classifies a subsystem `Unresponsive`.
    #[serde(with = "humantime_serde")]
    pub liveness_timeout: Duration,

    /// Rolling mean latency above this classifies a subsystem `Degraded`.
    #[serde(with = "humantime_serde")]
    pub latency_threshold: Duration,

    /// Window error rate (0.0..=1.0) above this classifies a subsystem `Degraded`.
    pub error_rate_threshold: f64,

    /// Number of samples in the latency / error sliding window.
    pub latency_window: usize,

    /// Samples required in the window before the error rate is evaluated.
    pub error_min_samples: usize,

    /// Continuous healthy time required to confirm a recovery.
    #[serde(with = "humantime_serde")]
    pub confirmation_window: Duration,

    /// Time allowed for a restart to be confirmed before escalation.
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,

    /// Sustained degradation before a restart is issued (`0s` = never).
    #[serde(with = "humantime_serde")]
    pub degraded_patience: Duration,

    /// Restarts allowed per subsystem within `restart_window`.
    pub max_restarts: usize,

    /// Rolling window of the restart budget.
    #[serde(with = "humantime_serde")]
    pub restart_window: Duration,

    /// Issue `ThrottleInput` when a healthy subsystem degrades.
    pub throttle_on_degraded: bool,

    /// Delay before a restart that could not be delivered is retried.
    #[serde(with = "humantime_serde")]
    pub delivery_retry: Duration,

    /// Finished actions and acknowledged alerts retained for inspection.
    pub history_limit: usize,

    /// Capacity of the monitor event stream.
    pub event_capacity: usize,

    /// Configuration for topics the monitor creates on demand.
    pub topic: TopicConfig,

    /// Ring size of `control.<id>` topics.
    pub control_capacity: usize,

    /// Collector wake-up backstop while the bus is idle.
    #[serde(with = "humantime_serde")]
    pub collector_tick: Duration,

    /// Maximum time to wait for components to stop on shutdown.
    #[serde(with = "humantime_serde")]
    pub grace: Duration,
}

impl MonitorConfig {
    /// Parses a TOML document; missing fields take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: MonitorConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads and parses a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Checks that the policy is internally consistent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.evaluation_interval.is_zero() {
            return Err(invalid("evaluation_interval", "must be greater than zero"));
        }
        if self.liveness_timeout.is_zero() {
            return Err(invalid("liveness_timeout", "must be greater than zero"));
        }
        if !(self.error_rate_threshold > 0.0 && self.error_rate_threshold <= 1.0) {
            return Err(invalid("error_rate_threshold", "must be within (0.0, 1.0]"));
        }
        if self.latency_window == 0 {
            return Err(invalid("latency_window", "must hold at least one sample"));
        }
        if self.recovery_timeout <= self.confirmation_window {
            return Err(invalid(
                "recovery_timeout",
                "must exceed confirmation_window or no recovery can be confirmed",
            ));
        }
        if self.restart_window.is_zero() {
            return Err(invalid("restart_window", "must be greater than zero"));
        }
        if self.delivery_retry.is_zero() {
            return Err(invalid("delivery_retry", "must be greater than zero"));
        }
        if self.collector_tick.is_zero() {
            return Err(invalid("collector_tick", "must be greater than zero"));
        }
        Ok(())
    }

    /// Returns the degradation patience as an `Option`.
    ///
    /// - `None` → sustained degradation never triggers a restart
    /// - `Some(d)` → restart after `d` of continuous `Degraded`
    #[inline]
    pub fn degraded_patience(&self) -> Option<Duration> {
        if self.degraded_patience.is_zero() {
            None
        } else {
            Some(self.degraded_patience)
        }
    }

    /// Returns the event stream capacity clamped to a minimum of 1.
    #[inline]
    pub fn event_capacity_clamped(&self) -> usize {
        self.event_capacity.max(1)
    }

    /// Returns the configuration of `control.<id>` topics.
    #[inline]
    pub fn control_topic_config(&self) -> TopicConfig {
        TopicConfig::new(self.control_capacity)
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

impl Default for MonitorConfig {
    /// Default configuration:
    ///
    /// - `evaluation_interval = 50ms`, `liveness_timeout = 300ms`
    /// - `latency_threshold = 100ms`, `error_rate_threshold = 0.25`
    /// - `latency_window = 64`, `error_min_samples = 4`
    /// - `confirmation_window = 500ms`, `recovery_timeout = 5s`
    /// - `degraded_patience = 2s`
    /// - `max_restarts = 3` per `restart_window = 1h`
    /// - `throttle_on_degraded = false`
    /// - `delivery_retry = 1s`, `history_limit = 256`
    /// - `event_capacity = 1024`, `topic = TopicConfig::default()`, `control_capacity = 32`
    /// - `collector_tick = 25ms`, `grace = 5s`
    fn default() -> Self {
        Self {
            evaluation_interval: Duration::from_millis(50),
            liveness_timeout: Duration::from_millis(300),
            latency_threshold: Duration::from_millis(100),
            error_rate_threshold: 0.25,
            latency_window: 64,
            error_min_samples: 4,
            confirmation_window: Duration::from_millis(500),
            recovery_timeout: Duration::from_secs(5),
            degraded_patience: Duration::from_secs(2),
            max_restarts: 3,
            restart_window: Duration::from_secs(3600),
            throttle_on_degraded: false,
            delivery_retry: Duration::from_secs(1),
            history_limit: 256,
            event_capacity: 1024,
            topic: TopicConfig::default(),
            control_capacity: 32,
            collector_tick: Duration::from_millis(25),
            grace: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OverwritePolicy;

    #[test]
    fn defaults_are_valid() {
        MonitorConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = MonitorConfig::from_toml_str(
            r#"
            liveness_timeout = "1s"
            max_restarts = 5
            restart_window = "30m"

            [topic]
            capacity = 16
            overwrite = "drop_newest"
            retention = "2s"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.liveness_timeout, Duration::from_secs(1));
        assert_eq!(cfg.max_restarts, 5);
        assert_eq!(cfg.restart_window, Duration::from_secs(1800));
        assert_eq!(cfg.topic.capacity, 16);
        assert_eq!(cfg.topic.overwrite, OverwritePolicy::DropNewest);
        assert_eq!(cfg.topic.retention, Some(Duration::from_secs(2)));
        assert_eq!(cfg.evaluation_interval, MonitorConfig::default().evaluation_interval);
    }

    #[test]
    fn inconsistent_windows_are_rejected() {
        let err = MonitorConfig::from_toml_str(
            r#"
            confirmation_window = "10s"
            recovery_timeout = "5s"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "recovery_timeout", .. }));
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = MonitorConfig::from_toml_str("liveness_timeout = 12 apples").unwrap_err();
        assert_eq!(err.as_label(), "config_parse");
    }

    #[test]
    fn file_loading_reads_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("monitor.toml");
        std::fs::write(&path, "throttle_on_degraded = true\n").unwrap();
        assert!(MonitorConfig::from_file(&path).unwrap().throttle_on_degraded);

        let missing = MonitorConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(missing.as_label(), "config_io");
    }

    #[test]
    fn zero_patience_means_never() {
        let cfg = MonitorConfig {
            degraded_patience: Duration::ZERO,
            ..MonitorConfig::default()
        };
        assert_eq!(cfg.degraded_patience(), None);
    }
}
