//! Monitor events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the detector, the orchestrator,
//! the runtime and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`MonitorEvent`] event classification and payload metadata
//! - [`EventBus`] thin wrapper over `tokio::sync::broadcast`
//!
//! The event stream is the only channel between monitor components: the
//! detector decides health, the orchestrator owns actions, the collector
//! owns records, and each learns about the others from events.

mod bus;
mod event;

pub use bus::EventBus;
pub use event::{EventKind, MonitorEvent};
