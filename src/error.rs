//! Error types used by the bus, the monitor and its collaborators.
//!
//! - [`BusError`] errors raised by the shared bus itself.
//! - [`MonitorError`] errors raised by telemetry queries and recovery.
//! - [`CipherError`] failures of the payload security boundary.
//! - [`BoundaryError`] bus or cipher failure of a sealed publish.
//! - [`AlertError`] alert sink delivery failures.
//! - [`ConfigError`] invalid or unreadable configuration.
//! - [`RuntimeError`] failures of the monitor runtime (shutdown).
//!
//! Every type provides `as_label` (stable snake_case label for logs/metrics).
//! Polling an empty topic is **not** an error: see [`Poll::NoData`](crate::bus::Poll).

use std::time::Duration;
use thiserror::Error;

use crate::bus::TopicConfig;

/// # Errors produced by the shared bus.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The topic was never registered with `create_topic`.
    #[error("unknown topic '{topic}'")]
    UnknownTopic {
        /// Requested topic name.
        topic: String,
    },

    /// A topic with the same name exists with a different configuration.
    ///
    /// Fatal only to the offending `create_topic` call.
    #[error("topic '{topic}' already registered with {existing:?}, requested {requested:?}")]
    ConfigConflict {
        /// Topic name.
        topic: String,
        /// Configuration of the existing registration.
        existing: TopicConfig,
        /// Configuration that was rejected.
        requested: TopicConfig,
    },

    /// The subscription handle does not belong to a live cursor on this topic.
    #[error("subscription {id} is not registered on topic '{topic}'")]
    UnknownSubscription {
        /// Topic name.
        topic: String,
        /// Subscription id.
        id: u64,
    },
}

impl BusError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use healbus::BusError;
    ///
    /// let err = BusError::UnknownTopic { topic: "telemetry.lidar".into() };
    /// assert_eq!(err.as_label(), "bus_unknown_topic");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BusError::UnknownTopic { .. } => "bus_unknown_topic",
            BusError::ConfigConflict { .. } => "bus_config_conflict",
            BusError::UnknownSubscription { .. } => "bus_unknown_subscription",
        }
    }
}

/// # Errors produced by the health monitor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// The subsystem has not been observed on the bus yet.
    #[error("unknown subsystem '{subsystem}'")]
    UnknownSubsystem {
        /// Requested subsystem id.
        subsystem: String,
    },

    /// The restart budget for the subsystem is spent within the rolling window.
    #[error("restart budget exceeded for '{subsystem}': {restarts} restarts within {window:?}")]
    RestartBudgetExceeded {
        /// Target subsystem.
        subsystem: String,
        /// Restarts already issued within the window.
        restarts: usize,
        /// Rolling window length.
        window: Duration,
    },

    /// A recovery action did not get confirmed in time.
    #[error("recovery of '{subsystem}' not confirmed within {timeout:?}")]
    ActionTimeout {
        /// Target subsystem.
        subsystem: String,
        /// Configured recovery timeout.
        timeout: Duration,
    },
}

impl MonitorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use healbus::MonitorError;
    /// use std::time::Duration;
    ///
    /// let err = MonitorError::ActionTimeout { subsystem: "motor-1".into(), timeout: Duration::from_secs(2) };
    /// assert_eq!(err.as_label(), "monitor_action_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            MonitorError::UnknownSubsystem { .. } => "monitor_unknown_subsystem",
            MonitorError::RestartBudgetExceeded { .. } => "monitor_restart_budget_exceeded",
            MonitorError::ActionTimeout { .. } => "monitor_action_timeout",
        }
    }

    /// True for errors that end automatic recovery and require an operator.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorError::RestartBudgetExceeded { .. } | MonitorError::ActionTimeout { .. }
        )
    }
}

/// # Errors produced by the payload security boundary.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CipherError {
    /// Session key has the wrong length for the cipher.
    #[error("invalid key length {len}, expected {expected}")]
    InvalidKey {
        /// Provided key length.
        len: usize,
        /// Required key length.
        expected: usize,
    },

    /// Sealed payload is too short to contain the cipher framing.
    #[error("sealed payload truncated ({len} bytes)")]
    Truncated {
        /// Length of the rejected payload.
        len: usize,
    },

    /// Encryption failed.
    #[error("seal failed: {0}")]
    Seal(String),

    /// Decryption or authentication failed.
    #[error("open failed: {0}")]
    Open(String),
}

impl CipherError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            CipherError::InvalidKey { .. } => "cipher_invalid_key",
            CipherError::Truncated { .. } => "cipher_truncated",
            CipherError::Seal(_) => "cipher_seal_failed",
            CipherError::Open(_) => "cipher_open_failed",
        }
    }
}

/// # Errors produced when crossing the bus through the security boundary.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoundaryError {
    /// The bus rejected the sealed envelope.
    #[error(transparent)]
    Bus(#[from] BusError),

    /// The payload could not be sealed or opened.
    #[error(transparent)]
    Cipher(#[from] CipherError),
}

impl BoundaryError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BoundaryError::Bus(e) => e.as_label(),
            BoundaryError::Cipher(e) => e.as_label(),
        }
    }
}

/// # Errors reported by alert sinks.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AlertError {
    /// The sink could not deliver the alert.
    #[error("alert sink '{sink}' failed: {reason}")]
    Delivery {
        /// Sink name.
        sink: &'static str,
        /// Failure detail.
        reason: String,
    },
}

impl AlertError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AlertError::Delivery { .. } => "alert_delivery_failed",
        }
    }
}

/// # Errors produced while loading or validating configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid TOML for [`MonitorConfig`](crate::MonitorConfig).
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field holds a value the monitor cannot work with.
    #[error("invalid config field '{field}': {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Io(_) => "config_io",
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by the monitor runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some components had to be aborted.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Components that did not stop in time.
        stuck: Vec<&'static str>,
    },

    /// The monitor was started twice.
    #[error("monitor is already running")]
    AlreadyRunning,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AlreadyRunning => "runtime_already_running",
        }
    }
}
