//! Shared bus: bounded topic rings for many concurrent publishers and subscribers.
//!
//! ## Contents
//! - [`SharedBus`] topic registry with `create_topic` / `publish` / `subscribe` / `poll` / `unsubscribe`
//! - [`TopicConfig`], [`OverwritePolicy`] per-topic capacity, full-ring behavior, retention
//! - [`Subscription`], [`Poll`] non-blocking cursor and its result
//! - [`Publisher`] per-sender sequence stamping
//!
//! ## Quick reference
//! - **Publishers**: subsystems (telemetry, data), `Orchestrator` (control commands).
//! - **Consumers**: `TelemetryCollector` (every topic), subsystems (their control topic).

mod publisher;
mod shared;
mod subscription;
mod topic;

pub use publisher::Publisher;
pub use shared::SharedBus;
pub use subscription::{Poll, Subscription};
pub use topic::{CursorStats, OverwritePolicy, Published, TopicConfig, TopicStats};
