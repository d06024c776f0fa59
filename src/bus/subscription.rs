//! # Subscription handles and poll results.
//!
//! A [`Subscription`] is a cursor on one topic. It holds the topic ring
//! directly, so polling does not touch the bus registry. Dropping the handle
//! detaches the cursor.

use std::sync::Arc;

use crate::envelope::Envelope;

use super::topic::{CursorStats, Topic};

/// Result of a non-blocking poll.
#[derive(Debug, Clone)]
pub enum Poll {
    /// The next unread envelope.
    Ready(Arc<Envelope>),
    /// Nothing new right now; the expected steady state of an idle topic.
    NoData,
}

impl Poll {
    /// Returns the envelope, if any.
    #[inline]
    pub fn into_envelope(self) -> Option<Arc<Envelope>> {
        match self {
            Poll::Ready(env) => Some(env),
            Poll::NoData => None,
        }
    }

    /// True when nothing was available.
    #[inline]
    pub fn is_no_data(&self) -> bool {
        matches!(self, Poll::NoData)
    }
}

/// Cursor over one topic.
pub struct Subscription {
    topic: Arc<Topic>,
    id: u64,
}

impl Subscription {
    pub(crate) fn new(topic: Arc<Topic>, id: u64) -> Self {
        Self { topic, id }
    }

    /// Topic this subscription reads.
    pub fn topic(&self) -> &str {
        self.topic.name()
    }

    /// Unique id of this cursor.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the next envelope or [`Poll::NoData`] without waiting.
    pub fn poll(&self) -> Poll {
        // The cursor lives as long as `self`, so the lookup cannot miss.
        match self.topic.next_for(self.id) {
            Ok(Some(env)) => Poll::Ready(env),
            Ok(None) | Err(_) => Poll::NoData,
        }
    }

    /// Returns delivery counters for this cursor.
    pub fn stats(&self) -> CursorStats {
        self.topic.cursor_stats(self.id).unwrap_or_default()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.topic.detach(self.id);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic())
            .field("id", &self.id)
            .finish()
    }
}
