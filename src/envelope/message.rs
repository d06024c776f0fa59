//! # Envelope: the unit of data exchanged on the bus.
//!
//! An [`Envelope`] is created once by a publisher and then shared read-only
//! (`Arc<Envelope>`) with every subscriber of its topic. The payload is opaque:
//! the bus never looks inside it, so it may just as well carry ciphertext.
//!
//! ## Ordering
//! `sequence` is assigned by the sender and must be strictly increasing per
//! sender. A jump larger than one means envelopes were lost in between.
//!
//! ## Example
//! ```rust
//! use healbus::{Envelope, PayloadKind};
//!
//! let env = Envelope::new("telemetry.motor-1", "motor-1", 1, PayloadKind::Status, &b"{}"[..]);
//! assert_eq!(env.topic.as_ref(), "telemetry.motor-1");
//! assert_eq!(env.payload.as_ref(), b"{}");
//! ```

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Classification of an envelope payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    /// Periodic status telemetry.
    Status,
    /// Error report; counted against the sender's error rate.
    Error,
    /// Control command addressed to a subsystem.
    Command,
    /// Liveness ping without metrics.
    Heartbeat,
    /// Application data (sensor frames, decisions, ...).
    Data,
}

impl PayloadKind {
    /// Short stable label for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadKind::Status => "status",
            PayloadKind::Error => "error",
            PayloadKind::Command => "command",
            PayloadKind::Heartbeat => "heartbeat",
            PayloadKind::Data => "data",
        }
    }
}

/// Typed, sequenced unit of data on a topic.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Topic this envelope is published on.
    pub topic: Arc<str>,
    /// Identifier of the publishing subsystem.
    pub sender_id: Arc<str>,
    /// Per-sender monotonic sequence number.
    pub sequence: u64,
    /// Monotonic clock value at creation.
    pub timestamp: Instant,
    /// Opaque payload bytes.
    pub payload: Bytes,
    /// Payload classification.
    pub payload_kind: PayloadKind,
}

impl Envelope {
    /// Creates an envelope stamped with the current monotonic time.
    pub fn new(
        topic: impl Into<Arc<str>>,
        sender_id: impl Into<Arc<str>>,
        sequence: u64,
        payload_kind: PayloadKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            topic: topic.into(),
            sender_id: sender_id.into(),
            sequence,
            timestamp: Instant::now(),
            payload: payload.into(),
            payload_kind,
        }
    }

    /// Header bytes a cipher authenticates alongside the payload.
    ///
    /// Layout: `topic 0x00 sender 0x00 sequence (u64 BE) kind`. A sealed
    /// payload moved to another topic, sender, sequence or kind fails to open.
    pub fn associated_data(&self) -> Bytes {
        let kind = self.payload_kind.as_str();
        let mut aad = BytesMut::with_capacity(self.topic.len() + self.sender_id.len() + 10 + kind.len());
        aad.put_slice(self.topic.as_bytes());
        aad.put_u8(0);
        aad.put_slice(self.sender_id.as_bytes());
        aad.put_u8(0);
        aad.put_u64(self.sequence);
        aad.put_slice(kind.as_bytes());
        aad.freeze()
    }

    /// Returns a copy of this envelope carrying a different payload.
    ///
    /// Used by the security boundary to swap plaintext for ciphertext.
    pub fn with_payload(&self, payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            ..self.clone()
        }
    }

    /// True when the payload is an error report.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self.payload_kind, PayloadKind::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn associated_data_covers_the_routing_header() {
        let env = Envelope::new("telemetry.arm", "arm", 7, PayloadKind::Status, &b"{}"[..]);
        let mut expected = b"telemetry.arm\0arm\0".to_vec();
        expected.extend_from_slice(&7u64.to_be_bytes());
        expected.extend_from_slice(b"status");
        assert_eq!(env.associated_data().as_ref(), expected.as_slice());

        let moved = Envelope::new("telemetry.arm", "arm", 8, PayloadKind::Status, &b"{}"[..]);
        assert_ne!(env.associated_data(), moved.associated_data());
        // the payload itself is not part of the header
        assert_eq!(env.associated_data(), env.with_payload(&b"other"[..]).associated_data());
    }
}
