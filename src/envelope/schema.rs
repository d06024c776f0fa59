//! # Payload schemas for control and telemetry topics.
//!
//! The bus itself treats payloads as opaque. The monitor and the subsystems it
//! supervises agree on two JSON schemas:
//!
//! ```text
//! control.<subsystem_id>    kind=Command          ControlCommand  { action, parameters, reason }
//! telemetry.<subsystem_id>  kind=Status | Error   TelemetryPayload { metrics, error_code, latency_us }
//! ```
//!
//! ## Example
//! ```rust
//! use healbus::{ActionKind, ControlCommand, control_topic};
//!
//! let cmd = ControlCommand::new(ActionKind::Restart).with_reason("unresponsive");
//! let bytes = cmd.to_bytes().unwrap();
//! assert_eq!(ControlCommand::from_bytes(&bytes).unwrap(), cmd);
//! assert_eq!(control_topic("motor-1"), "control.motor-1");
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::recovery::ActionKind;

/// Topic prefix for commands addressed to a subsystem.
pub const CONTROL_PREFIX: &str = "control.";
/// Topic prefix for telemetry published by a subsystem.
pub const TELEMETRY_PREFIX: &str = "telemetry.";

/// Returns the control topic of a subsystem (`control.<id>`).
pub fn control_topic(subsystem: &str) -> String {
    format!("{CONTROL_PREFIX}{subsystem}")
}

/// Returns the telemetry topic of a subsystem (`telemetry.<id>`).
pub fn telemetry_topic(subsystem: &str) -> String {
    format!("{TELEMETRY_PREFIX}{subsystem}")
}

/// Extracts the subsystem id from a `control.` or `telemetry.` topic name.
pub fn subsystem_of(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(CONTROL_PREFIX)
        .or_else(|| topic.strip_prefix(TELEMETRY_PREFIX))
        .filter(|id| !id.is_empty())
}

/// Payload could not be encoded or decoded.
#[derive(Error, Debug)]
#[error("malformed payload: {0}")]
pub struct SchemaError(#[from] serde_json::Error);

/// Command published on `control.<id>` for the target subsystem to interpret.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlCommand {
    /// What the target is asked to do.
    pub action: ActionKind,
    /// Action-specific parameters (e.g. throttle factor).
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
    /// Why the monitor issued the command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ControlCommand {
    /// Creates a command without parameters.
    pub fn new(action: ActionKind) -> Self {
        Self {
            action,
            parameters: serde_json::Map::new(),
            reason: None,
        }
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Adds one parameter.
    #[inline]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Encodes the command as a JSON payload.
    pub fn to_bytes(&self) -> Result<Bytes, SchemaError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a command from a JSON payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Status or error report published on `telemetry.<id>`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryPayload {
    /// Free-form metrics blob.
    #[serde(default)]
    pub metrics: serde_json::Value,
    /// Error code when the report describes a failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    /// Self-reported processing latency in microseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_us: Option<u64>,
}

impl TelemetryPayload {
    /// Creates a report carrying the given metrics.
    pub fn with_metrics(metrics: serde_json::Value) -> Self {
        Self {
            metrics,
            ..Self::default()
        }
    }

    /// Attaches a self-reported latency.
    #[inline]
    pub fn latency_us(mut self, micros: u64) -> Self {
        self.latency_us = Some(micros);
        self
    }

    /// Attaches an error code.
    #[inline]
    pub fn error_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Encodes the report as a JSON payload.
    pub fn to_bytes(&self) -> Result<Bytes, SchemaError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a report; an empty payload is a report without metrics.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsystem_is_extracted_from_known_prefixes() {
        assert_eq!(subsystem_of("control.motor-1"), Some("motor-1"));
        assert_eq!(subsystem_of("telemetry.lidar"), Some("lidar"));
        assert_eq!(subsystem_of("telemetry."), None);
        assert_eq!(subsystem_of("vision.frames"), None);
    }

    #[test]
    fn control_command_wire_format_is_snake_case() {
        let cmd = ControlCommand::new(ActionKind::ThrottleInput).with_parameter("factor", 0.5);
        let text = String::from_utf8(cmd.to_bytes().unwrap().to_vec()).unwrap();
        assert!(text.contains("\"action\":\"throttle_input\""), "{text}");
        assert!(text.contains("\"factor\":0.5"), "{text}");
    }

    #[test]
    fn telemetry_tolerates_missing_fields_and_rejects_garbage() {
        let report = TelemetryPayload::from_bytes(br#"{"latency_us": 1200}"#).unwrap();
        assert_eq!(report.latency_us, Some(1200));
        assert!(report.error_code.is_none());

        assert_eq!(TelemetryPayload::from_bytes(b"").unwrap(), TelemetryPayload::default());
        assert!(TelemetryPayload::from_bytes(b"\xff\x00not json").is_err());
    }
}
