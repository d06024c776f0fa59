//! # Topic ring: bounded, per-topic envelope storage.
//!
//! Each topic owns one ring guarded by its own [`parking_lot::Mutex`]. The
//! lock is held only for O(1) bookkeeping, never across an await point and
//! never across topics, so a busy topic cannot stall another one.
//!
//! ## Layout
//! ```text
//!   absolute index:   17    18    19    20         head = 21
//!                  ┌─────┬─────┬─────┬─────┐
//!   entries:       │ e17 │ e18 │ e19 │ e20 │   capacity = 4
//!                  └─────┴─────┴─────┴─────┘
//!                     ▲                 ▲
//!           cursor A (next=17)   cursor B (next=20)
//! ```
//!
//! ## Rules
//! - Every stored envelope gets the next absolute index; indices never repeat.
//! - A cursor that points below the oldest retained index has lagged; it is
//!   moved forward and the skipped count is recorded.
//! - Per cursor, an envelope whose sequence is not above the last delivered
//!   sequence of its sender is skipped (never delivered twice, never backwards).
//! - An entry consumed by every attached cursor is reclaimed.
//! - Entries older than the topic's retention are dropped lazily.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::envelope::Envelope;
use crate::error::BusError;

/// What to do with a publish when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwritePolicy {
    /// Overwrite the oldest entry (bounded staleness, favors fresh data).
    #[default]
    OverwriteOldest,
    /// Keep the ring as is and drop the incoming envelope.
    DropNewest,
}

/// Static configuration of a topic, fixed at creation.
///
/// ## Field semantics
/// - `capacity`: ring size (min 1; clamped)
/// - `overwrite`: behavior when the ring is full
/// - `retention`: maximum envelope age (`None` = kept until overwritten or consumed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Number of envelopes the ring holds.
    pub capacity: usize,
    /// Full-ring behavior.
    #[serde(default)]
    pub overwrite: OverwritePolicy,
    /// Optional retention deadline.
    #[serde(default, with = "humantime_serde")]
    pub retention: Option<Duration>,
}

impl TopicConfig {
    /// Ring of `capacity` entries with the default overwrite policy.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            overwrite: OverwritePolicy::default(),
            retention: None,
        }
    }

    /// Sets the full-ring behavior.
    #[inline]
    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the retention deadline.
    #[inline]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Returns the same configuration with capacity clamped to a minimum of 1.
    #[inline]
    pub(crate) fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        self
    }
}

impl Default for TopicConfig {
    /// 256 entries, overwrite oldest, no retention deadline.
    fn default() -> Self {
        Self::new(256)
    }
}

/// Outcome of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    /// Stored without displacing anything.
    Stored,
    /// Stored; the oldest entry was overwritten.
    Overwrote,
    /// Ring was full and the policy is [`OverwritePolicy::DropNewest`].
    Dropped,
}

/// Counters for one topic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicStats {
    /// Envelopes stored since creation.
    pub published: u64,
    /// Entries overwritten before every cursor consumed them.
    pub overwritten: u64,
    /// Incoming envelopes rejected by a full ring.
    pub dropped: u64,
    /// Entries dropped by the retention deadline.
    pub expired: u64,
    /// Entries currently held.
    pub retained: usize,
    /// Attached cursors.
    pub subscribers: usize,
}

/// Counters for one subscription cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CursorStats {
    /// Envelopes delivered through this cursor.
    pub delivered: u64,
    /// Entries skipped because they were overwritten or expired before being read.
    pub lagged: u64,
    /// Missing sequence numbers observed across senders (loss upstream or lag).
    pub gaps: u64,
    /// Entries skipped because their sequence was not above the last delivered one.
    pub stale: u64,
}

struct Slot {
    index: u64,
    env: Arc<Envelope>,
}

struct Cursor {
    next: u64,
    last_seq: HashMap<Arc<str>, u64>,
    stats: CursorStats,
}

#[derive(Default)]
struct RingState {
    entries: VecDeque<Slot>,
    head: u64,
    cursors: HashMap<u64, Cursor>,
    stats: TopicStats,
}

impl RingState {
    fn oldest_index(&self) -> u64 {
        self.entries.front().map_or(self.head, |s| s.index)
    }

    fn prune_expired(&mut self, retention: Option<Duration>, now: Instant) {
        let Some(retention) = retention else { return };
        while let Some(front) = self.entries.front() {
            if now.saturating_duration_since(front.env.timestamp) <= retention {
                break;
            }
            self.entries.pop_front();
            self.stats.expired += 1;
        }
    }

    /// Drops entries every cursor has already consumed.
    fn reclaim(&mut self) {
        let Some(min_next) = self.cursors.values().map(|c| c.next).min() else {
            return;
        };
        while self.entries.front().is_some_and(|s| s.index < min_next) {
            self.entries.pop_front();
        }
    }
}

/// A named ring of envelopes.
pub(crate) struct Topic {
    name: Arc<str>,
    config: TopicConfig,
    state: Mutex<RingState>,
}

impl Topic {
    pub(crate) fn new(name: Arc<str>, config: TopicConfig) -> Self {
        Self {
            name,
            config: config.normalized(),
            state: Mutex::new(RingState::default()),
        }
    }

    pub(crate) fn name(&self) -> &Arc<str> {
        &self.name
    }

    pub(crate) fn config(&self) -> TopicConfig {
        self.config
    }

    /// Appends an envelope; O(1), never waits on readers.
    pub(crate) fn push(&self, env: Arc<Envelope>) -> Published {
        let mut st = self.state.lock();
        st.prune_expired(self.config.retention, Instant::now());

        let mut outcome = Published::Stored;
        if st.entries.len() >= self.config.capacity {
            match self.config.overwrite {
                OverwritePolicy::OverwriteOldest => {
                    st.entries.pop_front();
                    st.stats.overwritten += 1;
                    outcome = Published::Overwrote;
                }
                OverwritePolicy::DropNewest => {
                    st.stats.dropped += 1;
                    return Published::Dropped;
                }
            }
        }

        let index = st.head;
        st.entries.push_back(Slot { index, env });
        st.head += 1;
        st.stats.published += 1;
        outcome
    }

    /// Attaches a cursor positioned at the oldest retained entry.
    pub(crate) fn attach(&self, id: u64) {
        let mut st = self.state.lock();
        let next = st.oldest_index();
        st.cursors.insert(
            id,
            Cursor {
                next,
                last_seq: HashMap::new(),
                stats: CursorStats::default(),
            },
        );
        st.stats.subscribers = st.cursors.len();
    }

    /// Detaches a cursor and reclaims what only it was holding back.
    pub(crate) fn detach(&self, id: u64) {
        let mut st = self.state.lock();
        if st.cursors.remove(&id).is_some() {
            st.stats.subscribers = st.cursors.len();
            st.reclaim();
        }
    }

    /// Returns the next deliverable envelope for cursor `id` without waiting.
    pub(crate) fn next_for(&self, id: u64) -> Result<Option<Arc<Envelope>>, BusError> {
        let mut st = self.state.lock();
        st.prune_expired(self.config.retention, Instant::now());

        let oldest = st.oldest_index();
        let head = st.head;
        let RingState {
            entries, cursors, ..
        } = &mut *st;

        let cursor = cursors
            .get_mut(&id)
            .ok_or_else(|| BusError::UnknownSubscription {
                topic: self.name.to_string(),
                id,
            })?;

        let was_front = cursor.next <= oldest;
        let delivered = loop {
            if cursor.next < oldest {
                cursor.stats.lagged += oldest - cursor.next;
                cursor.next = oldest;
            }
            if cursor.next >= head {
                break None;
            }

            let pos = (cursor.next - oldest) as usize;
            let env = Arc::clone(&entries[pos].env);
            cursor.next += 1;

            match cursor.last_seq.get(&env.sender_id).copied() {
                Some(last) if env.sequence <= last => {
                    cursor.stats.stale += 1;
                    continue;
                }
                Some(last) => cursor.stats.gaps += env.sequence - last - 1,
                None => {}
            }
            cursor.last_seq.insert(Arc::clone(&env.sender_id), env.sequence);
            cursor.stats.delivered += 1;
            break Some(env);
        };

        if was_front {
            st.reclaim();
        }
        Ok(delivered)
    }

    pub(crate) fn stats(&self) -> TopicStats {
        let st = self.state.lock();
        TopicStats {
            retained: st.entries.len(),
            ..st.stats
        }
    }

    pub(crate) fn cursor_stats(&self, id: u64) -> Option<CursorStats> {
        self.state.lock().cursors.get(&id).map(|c| c.stats)
    }
}
