//! Bus data model: envelopes and the payload schemas layered on top of them.
//!
//! ## Contents
//! - [`Envelope`], [`PayloadKind`] the typed, sequenced unit exchanged on the bus
//! - [`ControlCommand`], [`TelemetryPayload`] JSON payload schemas for the
//!   `control.<id>` and `telemetry.<id>` topics
//! - [`control_topic`], [`telemetry_topic`] topic naming helpers

mod message;
mod schema;

pub use message::{Envelope, PayloadKind};
pub use schema::{
    CONTROL_PREFIX, ControlCommand, SchemaError, TELEMETRY_PREFIX, TelemetryPayload,
    control_topic, subsystem_of, telemetry_topic,
};
