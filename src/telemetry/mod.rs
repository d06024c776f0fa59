//! Health telemetry: per-subsystem records derived from bus traffic.
//!
//! - [`TelemetryCollector`] follows every topic and owns the records
//! - [`SubsystemRecord`] point-in-time copy handed to readers
//! - [`LatencyWindow`] fixed-size sliding window behind latency and error rate

mod collector;
mod record;
mod window;

pub use collector::TelemetryCollector;
pub use record::SubsystemRecord;
pub use window::LatencyWindow;
