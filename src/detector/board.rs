//! # Health board: the detector's decided states, readable by anyone.
//!
//! The detector writes the board before it publishes the matching
//! `StateChanged` event. Consumers that lag behind the event stream
//! reconcile against it instead of waiting for a transition that was dropped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::health::HealthState;

/// Shared map of subsystem id to decided health state.
///
/// Cheap to clone; all clones read the same states.
#[derive(Clone, Default)]
pub struct HealthBoard {
    states: Arc<RwLock<HashMap<Arc<str>, HealthState>>>,
}

impl HealthBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set(&self, id: &Arc<str>, state: HealthState) {
        self.states.write().insert(Arc::clone(id), state);
    }

    /// Decided state of one subsystem.
    pub fn get(&self, id: &str) -> Option<HealthState> {
        self.states.read().get(id).copied()
    }

    /// Every decided state, sorted by subsystem id.
    pub fn snapshot(&self) -> Vec<(Arc<str>, HealthState)> {
        let mut all: Vec<_> = self
            .states
            .read()
            .iter()
            .map(|(id, s)| (Arc::clone(id), *s))
            .collect();
        all.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        all
    }
}

impl std::fmt::Debug for HealthBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.snapshot()).finish()
    }
}
