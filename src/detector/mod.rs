//! Anomaly detection: periodic health classification of every subsystem.
//!
//! - [`HealthState`] the five health states
//! - [`classify`], [`Thresholds`] ordered classification rules
//! - [`HealthClassifier`] synchronous core with recovery hysteresis
//! - [`AnomalyDetector`] periodic task publishing `StateChanged` events
//! - [`HealthBoard`] decided states shared with lagging consumers

mod anomaly;
mod board;
mod classifier;
mod health;
mod rules;

pub use anomaly::AnomalyDetector;
pub use board::HealthBoard;
pub use classifier::{HealthClassifier, Transition};
pub use health::HealthState;
pub use rules::{Thresholds, Verdict, classify};
