//! # Shared bus: registry of topic rings.
//!
//! [`SharedBus`] maps topic names to independent rings. The registry lock is
//! taken only to create or look up a topic; publishing and polling lock the
//! single target ring, so producers of one topic never contend with consumers
//! of another.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                                   Subscribers (many):
//!   AI module  ──┐                     ┌─ topic "telemetry.motor-1" ─┐  ┌──► Collector
//!   motor-1    ──┼── publish(env) ──►  ├─ topic "control.motor-1"   ─┼──┼──► motor-1
//!   Orchestr.  ──┘   (O(1), no wait)   └─ topic "vision.frames"     ─┘  └──► AI module
//!                                          (1 ring + 1 mutex each)        poll() → Ready | NoData
//! ```
//!
//! ## Rules
//! - **Non-blocking**: `publish` and `poll` only take a short ring lock.
//! - **Idempotent creation**: identical re-registration is a no-op;
//!   a different configuration fails with `ConfigConflict` and leaves the
//!   existing topic untouched.
//! - **Activity signal**: every stored envelope notifies [`SharedBus::activity`].
//!
//! ## Example
//! ```rust
//! use healbus::{PayloadKind, SharedBus, TopicConfig};
//!
//! let bus = SharedBus::new();
//! bus.create_topic("telemetry.motor-1", TopicConfig::new(16)).unwrap();
//!
//! let sub = bus.subscribe("telemetry.motor-1").unwrap();
//! let motor = bus.publisher("motor-1");
//! motor.send("telemetry.motor-1", PayloadKind::Status, &b"{}"[..]).unwrap();
//!
//! let env = bus.poll(&sub).into_envelope().unwrap();
//! assert_eq!(env.sequence, 1);
//! assert!(bus.poll(&sub).is_no_data());
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::envelope::Envelope;
use crate::error::BusError;

use super::publisher::Publisher;
use super::subscription::{Poll, Subscription};
use super::topic::{Published, Topic, TopicConfig, TopicStats};

struct Inner {
    topics: RwLock<HashMap<Arc<str>, Arc<Topic>>>,
    generation: AtomicU64,
    next_subscription: AtomicU64,
    activity: Notify,
}

/// Concurrent multi-producer/multi-consumer topic bus.
///
/// Cheap to clone (an `Arc` inside); all clones address the same topics.
#[derive(Clone)]
pub struct SharedBus {
    inner: Arc<Inner>,
}

impl Default for SharedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SharedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedBus")
            .field("topics", &self.topics())
            .finish()
    }
}

impl SharedBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                topics: RwLock::new(HashMap::new()),
                generation: AtomicU64::new(0),
                next_subscription: AtomicU64::new(1),
                activity: Notify::new(),
            }),
        }
    }

    /// Registers a topic.
    ///
    /// Returns `Ok(true)` when the topic was created and `Ok(false)` when an
    /// identical registration already existed.
    pub fn create_topic(&self, name: &str, config: TopicConfig) -> Result<bool, BusError> {
        let requested = config.normalized();
        let mut topics = self.inner.topics.write();
        if let Some(existing) = topics.get(name) {
            let existing = existing.config();
            if existing == requested {
                return Ok(false);
            }
            warn!(topic = name, ?existing, ?requested, "topic config conflict");
            return Err(BusError::ConfigConflict {
                topic: name.to_string(),
                existing,
                requested,
            });
        }

        let name: Arc<str> = Arc::from(name);
        topics.insert(Arc::clone(&name), Arc::new(Topic::new(Arc::clone(&name), requested)));
        drop(topics);

        self.inner.generation.fetch_add(1, Ordering::Release);
        debug!(topic = %name, capacity = requested.capacity, "topic created");
        Ok(true)
    }

    /// Publishes an envelope on its topic.
    pub fn publish(&self, envelope: Envelope) -> Result<Published, BusError> {
        let topic = self.topic(&envelope.topic)?;
        let outcome = topic.push(Arc::new(envelope));
        match outcome {
            Published::Dropped => {
                debug!(topic = %topic.name(), "ring full, envelope dropped");
            }
            Published::Stored | Published::Overwrote => self.inner.activity.notify_waiters(),
        }
        Ok(outcome)
    }

    /// Opens a subscription starting at the oldest retained envelope.
    pub fn subscribe(&self, topic: &str) -> Result<Subscription, BusError> {
        let topic = self.topic(topic)?;
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        topic.attach(id);
        Ok(Subscription::new(topic, id))
    }

    /// Returns the next envelope for the subscription, or [`Poll::NoData`].
    ///
    /// Never waits.
    pub fn poll(&self, subscription: &Subscription) -> Poll {
        subscription.poll()
    }

    /// Closes a subscription; its cursor stops holding entries back.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Returns a publisher that stamps sequences for `sender_id`.
    pub fn publisher(&self, sender_id: &str) -> Publisher {
        Publisher::new(self.clone(), sender_id)
    }

    /// Returns the configuration of a topic.
    pub fn topic_config(&self, name: &str) -> Result<TopicConfig, BusError> {
        Ok(self.topic(name)?.config())
    }

    /// Returns counters for a topic.
    pub fn topic_stats(&self, name: &str) -> Result<TopicStats, BusError> {
        Ok(self.topic(name)?.stats())
    }

    /// Sorted list of registered topic names.
    pub fn topics(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .topics
            .read()
            .keys()
            .map(|k| k.to_string())
            .collect();
        names.sort_unstable();
        names
    }

    /// Counter bumped each time a topic is created.
    ///
    /// Consumers that follow every topic compare it to their last seen value
    /// to discover late registrations.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    /// Signalled whenever an envelope is stored on any topic.
    pub fn activity(&self) -> &Notify {
        &self.inner.activity
    }

    fn topic(&self, name: &str) -> Result<Arc<Topic>, BusError> {
        self.inner
            .topics
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| BusError::UnknownTopic {
                topic: name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::OverwritePolicy;
    use crate::envelope::PayloadKind;

    #[test]
    fn create_topic_is_idempotent_for_identical_config() {
        let bus = SharedBus::new();
        assert!(bus.create_topic("a", TopicConfig::new(4)).unwrap());
        assert!(!bus.create_topic("a", TopicConfig::new(4)).unwrap());
        assert_eq!(bus.generation(), 1);
    }

    #[test]
    fn conflicting_config_fails_only_that_call() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig::new(4)).unwrap();

        let err = bus
            .create_topic(
                "a",
                TopicConfig::new(4).with_overwrite(OverwritePolicy::DropNewest),
            )
            .unwrap_err();
        assert!(matches!(err, BusError::ConfigConflict { .. }));
        assert_eq!(bus.topic_config("a").unwrap(), TopicConfig::new(4));

        bus.create_topic("b", TopicConfig::new(2)).unwrap();
        let out = bus
            .publisher("x")
            .send("b", PayloadKind::Data, &b"ok"[..])
            .unwrap();
        assert_eq!(out, Published::Stored);
    }

    #[test]
    fn unknown_topic_is_rejected() {
        let bus = SharedBus::new();
        let env = Envelope::new("nope", "x", 1, PayloadKind::Data, Vec::new());
        assert_eq!(
            bus.publish(env).unwrap_err(),
            BusError::UnknownTopic {
                topic: "nope".into()
            }
        );
        assert!(bus.subscribe("nope").is_err());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig {
            capacity: 0,
            ..TopicConfig::default()
        })
        .unwrap();
        assert_eq!(bus.topic_config("a").unwrap().capacity, 1);
    }

    #[test]
    fn each_subscriber_sees_every_envelope() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig::new(8)).unwrap();
        let s1 = bus.subscribe("a").unwrap();
        let s2 = bus.subscribe("a").unwrap();
        let p = bus.publisher("x");
        p.send("a", PayloadKind::Data, &b"1"[..]).unwrap();
        p.send("a", PayloadKind::Data, &b"2"[..]).unwrap();

        for sub in [&s1, &s2] {
            let a = bus.poll(sub).into_envelope().unwrap();
            let b = bus.poll(sub).into_envelope().unwrap();
            assert_eq!((a.sequence, b.sequence), (1, 2));
            assert!(bus.poll(sub).is_no_data());
        }
        assert_eq!(bus.topic_stats("a").unwrap().subscribers, 2);

        bus.unsubscribe(s1);
        assert_eq!(bus.topic_stats("a").unwrap().subscribers, 1);
    }

    #[tokio::test]
    async fn publish_signals_activity() {
        let bus = SharedBus::new();
        bus.create_topic("a", TopicConfig::new(8)).unwrap();

        let waiter = {
            let bus = bus.clone();
            tokio::spawn(async move { bus.activity().notified().await })
        };
        tokio::task::yield_now().await;

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while !waiter.is_finished() && tokio::time::Instant::now() < deadline {
            bus.publisher("x")
                .send("a", PayloadKind::Data, Vec::new())
                .unwrap();
            tokio::task::yield_now().await;
        }
        assert!(waiter.await.is_ok());
    }
}
