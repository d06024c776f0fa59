//! Runtime core: wiring and lifecycle.
//!
//! The public API from this module is [`Monitor`] (built with [`MonitorBuilder`])
//! and the [`HealthReport`] it produces.
//!
//! Internal modules:
//! - [`monitor`]: spawns the components, handles graceful shutdown;
//! - [`builder`]: assembles bus, event stream, subscribers, sinks and cipher;
//! - [`ledger`]: counts detected faults from the event stream;
//! - [`report`]: serializable health summary;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod ledger;
mod monitor;
mod report;
mod shutdown;

pub use builder::MonitorBuilder;
pub use monitor::Monitor;
pub use report::{HealthReport, SubsystemReport};
