//! # Event subscribers for the monitor.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`]
//! fan-out and built-in implementations for monitor events broadcast through
//! the [`EventBus`](crate::events::EventBus).
//!
//! ## Architecture
//! ```text
//! Event flow:
//!   Detector / Orchestrator ── publish(MonitorEvent) ──► EventBus ──► subscriber_listener
//!                                                                          │
//!                                                                 SubscriberSet::emit
//!                                                            ┌────────┬────┴────┬────────┐
//!                                                            ▼        ▼         ▼        ▼
//!                                                        LogWriter  Metrics   Pager    ...
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
