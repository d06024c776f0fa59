//! # Per-sender publisher.
//!
//! [`Publisher`] owns the sequence counter of one sender so every envelope it
//! builds carries a strictly increasing sequence. A failed publish still
//! consumes its sequence number; subscribers see that as a gap.
//!
//! A `Publisher` may be shared between threads: stamping and storing an
//! envelope happen under the sender lock, so the ring receives one sender's
//! envelopes in sequence order.

use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::envelope::{Envelope, PayloadKind};
use crate::error::BusError;

use super::shared::SharedBus;
use super::topic::Published;

/// Builds and publishes envelopes on behalf of one sender.
pub struct Publisher {
    bus: SharedBus,
    sender: Arc<str>,
    sequence: Mutex<u64>,
}

impl Publisher {
    pub(crate) fn new(bus: SharedBus, sender: &str) -> Self {
        Self {
            bus,
            sender: Arc::from(sender),
            sequence: Mutex::new(0),
        }
    }

    /// Sender id stamped on every envelope.
    pub fn sender_id(&self) -> &str {
        &self.sender
    }

    /// Builds the next envelope without publishing it.
    ///
    /// Envelopes built here must reach the bus in the order they were built.
    pub fn envelope(&self, topic: &str, kind: PayloadKind, payload: impl Into<Bytes>) -> Envelope {
        let mut seq = self.sequence.lock();
        *seq += 1;
        Envelope::new(topic, Arc::clone(&self.sender), *seq, kind, payload)
    }

    /// Builds and publishes the next envelope.
    pub fn send(
        &self,
        topic: &str,
        kind: PayloadKind,
        payload: impl Into<Bytes>,
    ) -> Result<Published, BusError> {
        self.send_with(topic, kind, payload, Ok)
    }

    /// Builds the next envelope, passes it through `prepare` and publishes
    /// the result, all under the sender lock.
    pub(crate) fn send_with<E>(
        &self,
        topic: &str,
        kind: PayloadKind,
        payload: impl Into<Bytes>,
        prepare: impl FnOnce(Envelope) -> Result<Envelope, E>,
    ) -> Result<Published, E>
    where
        E: From<BusError>,
    {
        let mut seq = self.sequence.lock();
        let next = *seq + 1;
        // a rejected envelope does not consume its sequence
        let env = prepare(Envelope::new(topic, Arc::clone(&self.sender), next, kind, payload))?;
        *seq = next;
        Ok(self.bus.publish(env)?)
    }

    /// Last sequence number handed out (0 before the first envelope).
    pub fn last_sequence(&self) -> u64 {
        *self.sequence.lock()
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("sender", &self.sender)
            .field("last_sequence", &self.last_sequence())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::TopicConfig;

    #[test]
    fn sequences_increase_even_across_failures() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig::new(4)).unwrap();
        let p = bus.publisher("arm");

        p.send("a", PayloadKind::Data, Vec::new()).unwrap();
        assert!(p.send("missing", PayloadKind::Data, Vec::new()).is_err());
        p.send("a", PayloadKind::Data, Vec::new()).unwrap();
        assert_eq!(p.last_sequence(), 3);

        let sub = bus.subscribe("a").unwrap();
        let first = sub.poll().into_envelope().unwrap();
        let second = sub.poll().into_envelope().unwrap();
        assert_eq!((first.sequence, second.sequence), (1, 3));
        assert_eq!(sub.stats().gaps, 1);
        assert_eq!(first.sender_id.as_ref(), "arm");
    }

    #[test]
    fn shared_publisher_never_reorders_its_sequences() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig::new(1 << 16)).unwrap();
        let sub = bus.subscribe("a").unwrap();
        let p = Arc::new(bus.publisher("arm"));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let p = Arc::clone(&p);
                std::thread::spawn(move || {
                    for _ in 0..5_000 {
                        p.send("a", PayloadKind::Data, Vec::new()).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().unwrap();
        }

        let mut delivered = 0u64;
        while let Some(env) = sub.poll().into_envelope() {
            delivered += 1;
            assert_eq!(env.sequence, delivered);
        }
        assert_eq!(delivered, 20_000);
        let stats = sub.stats();
        assert_eq!((stats.stale, stats.gaps), (0, 0));
    }
}
