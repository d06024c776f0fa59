//! # Sealed bus: the bus seen from a separate trust domain.
//!
//! [`SealedBus`] seals payloads before they enter the shared bus and opens
//! them on the way out. Topic, sender, sequence and kind stay in the clear
//! and are bound to the payload as associated data; only the payload bytes
//! are transformed, so ordering and loss accounting work the same on sealed
//! topics.
//!
//! ```text
//!   trust domain A           shared bus            trust domain B
//!   plaintext ──seal──►  [ opaque bytes ring ]  ──open──► plaintext
//! ```

use std::sync::Arc;

use bytes::Bytes;
use tracing::warn;

use crate::bus::{Poll, Published, Publisher, SharedBus, Subscription};
use crate::envelope::{Envelope, PayloadKind};
use crate::error::BoundaryError;

use super::cipher::PayloadCipher;

/// Bus handle that applies a [`PayloadCipher`] at the boundary.
#[derive(Clone)]
pub struct SealedBus {
    bus: SharedBus,
    cipher: Arc<dyn PayloadCipher>,
}

impl SealedBus {
    /// Wraps `bus` with `cipher`.
    pub fn new(bus: SharedBus, cipher: Arc<dyn PayloadCipher>) -> Self {
        Self { bus, cipher }
    }

    /// Underlying bus (carries sealed bytes).
    pub fn bus(&self) -> &SharedBus {
        &self.bus
    }

    /// Cipher applied at this boundary.
    pub fn cipher(&self) -> &Arc<dyn PayloadCipher> {
        &self.cipher
    }

    /// Seals the payload of `envelope` and publishes it.
    pub fn publish(&self, envelope: Envelope) -> Result<Published, BoundaryError> {
        let sealed = self.seal(&envelope)?;
        Ok(self.bus.publish(sealed)?)
    }

    /// Builds the next envelope of `publisher`, seals it and publishes it.
    ///
    /// Concurrent senders sharing `publisher` reach the bus in sequence order.
    pub fn send(
        &self,
        publisher: &Publisher,
        topic: &str,
        kind: PayloadKind,
        payload: impl Into<Bytes>,
    ) -> Result<Published, BoundaryError> {
        publisher.send_with(topic, kind, payload, |env| self.seal(&env))
    }

    fn seal(&self, envelope: &Envelope) -> Result<Envelope, BoundaryError> {
        let sealed = self.cipher.seal(&envelope.payload, &envelope.associated_data())?;
        Ok(envelope.with_payload(sealed))
    }

    /// Polls `subscription` and opens the payload.
    ///
    /// `Ok(None)` means no data. A payload that fails to open is consumed and
    /// reported as an error; the next poll continues with the following entry.
    pub fn poll(&self, subscription: &Subscription) -> Result<Option<Envelope>, BoundaryError> {
        let Poll::Ready(env) = self.bus.poll(subscription) else {
            return Ok(None);
        };
        match self.cipher.open(&env.payload, &env.associated_data()) {
            Ok(plain) => Ok(Some(env.with_payload(plain))),
            Err(e) => {
                warn!(
                    topic = %env.topic,
                    sender = %env.sender_id,
                    seq = env.sequence,
                    cipher = self.cipher.name(),
                    error = e.as_label(),
                    "cannot open sealed payload"
                );
                Err(e.into())
            }
        }
    }
}

impl std::fmt::Debug for SealedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBus")
            .field("cipher", &self.cipher.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TopicConfig;
    use crate::error::CipherError;

    /// XOR "cipher" that also refuses payloads starting with 0xFF.
    struct Xor(u8);

    impl PayloadCipher for Xor {
        fn seal(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Bytes, CipherError> {
            Ok(plaintext.iter().map(|b| b ^ self.0).collect())
        }

        fn open(&self, sealed: &[u8], _aad: &[u8]) -> Result<Bytes, CipherError> {
            if sealed.first() == Some(&0xFF) {
                return Err(CipherError::Open("bad frame".into()));
            }
            Ok(sealed.iter().map(|b| b ^ self.0).collect())
        }
    }

    #[test]
    fn payload_crosses_sealed_and_arrives_intact() {
        let bus = SharedBus::new();
        bus.create_topic("vision.frames", TopicConfig::new(4)).unwrap();
        let sealed = SealedBus::new(bus.clone(), Arc::new(Xor(0x5A)));

        let raw = bus.subscribe("vision.frames").unwrap();
        let opened = bus.subscribe("vision.frames").unwrap();
        let cam = bus.publisher("camera");
        sealed
            .send(&cam, "vision.frames", PayloadKind::Data, &b"frame-1"[..])
            .unwrap();

        let on_wire = raw.poll().into_envelope().unwrap();
        assert_ne!(on_wire.payload.as_ref(), b"frame-1");

        let env = sealed.poll(&opened).unwrap().unwrap();
        assert_eq!(env.payload.as_ref(), b"frame-1");
        assert_eq!(env.sequence, 1);
        assert!(sealed.poll(&opened).unwrap().is_none());
    }

    #[test]
    fn unopenable_payload_is_reported_and_skipped() {
        let bus = SharedBus::new();
        bus.create_topic("t", TopicConfig::new(4)).unwrap();
        let sealed = SealedBus::new(bus.clone(), Arc::new(Xor(0x01)));
        let sub = bus.subscribe("t").unwrap();

        let p = bus.publisher("x");
        p.send("t", PayloadKind::Data, &[0xFFu8, 0x00][..]).unwrap();
        sealed.send(&p, "t", PayloadKind::Data, &b"ok"[..]).unwrap();

        let err = sealed.poll(&sub).unwrap_err();
        assert_eq!(err.as_label(), "cipher_open_failed");
        assert_eq!(sealed.poll(&sub).unwrap().unwrap().payload.as_ref(), b"ok");
    }
}
