//! # Fault ledger with sequence-based ordering.
//!
//! Keeps the monitor's own record of health transitions seen on the event
//! stream, used by the health report. Stale events (by global sequence) are
//! rejected so a lagging listener cannot rewind state.
//!
//! ## Architecture
//! ```text
//! Detector ──► EventBus ──► subscriber_listener() ──► FaultLedger::update()
//!                                                          │
//!                                                          ▼
//!                                          HashMap<String, LedgerEntry>
//!                                          (id → {seq, state, faults})
//! ```
//!
//! ## Rules
//! - Only `StateChanged` events change state
//! - A fault is counted when a subsystem enters `Degraded`, `Unresponsive` or
//!   `Failed` from `Healthy` or `Recovering`
//! - Events with `seq <= last_seq` are **rejected** (stale)

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::detector::HealthState;
use crate::events::{EventKind, MonitorEvent};

#[derive(Debug, Clone)]
struct LedgerEntry {
    last_seq: Option<u64>,
    state: HealthState,
    faults: u64,
}

/// Thread-safe tally of detected faults.
#[derive(Debug, Default)]
pub(crate) struct FaultLedger {
    state: RwLock<HashMap<String, LedgerEntry>>,
}

impl FaultLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Applies a state transition if it is newer than the last one seen.
    ///
    /// Returns `true` when a new fault was counted.
    pub(crate) fn update(&self, ev: &MonitorEvent) -> bool {
        if ev.kind != EventKind::StateChanged {
            return false;
        }
        let (Some(name), Some(from), Some(to)) = (ev.subsystem.as_deref(), ev.from, ev.to) else {
            return false;
        };

        let mut state = self.state.write();
        let entry = state.entry(name.to_string()).or_insert(LedgerEntry {
            last_seq: None,
            state: HealthState::Healthy,
            faults: 0,
        });
        if entry.last_seq.is_some_and(|last| ev.seq <= last) {
            return false;
        }
        entry.last_seq = Some(ev.seq);
        entry.state = to;

        let fault = is_fault(to) && !is_fault(from);
        if fault {
            entry.faults += 1;
        }
        fault
    }

    /// Faults counted for one subsystem.
    pub(crate) fn faults(&self, name: &str) -> u64 {
        self.state.read().get(name).map(|e| e.faults).unwrap_or(0)
    }

    /// Faults counted across all subsystems.
    pub(crate) fn total(&self) -> u64 {
        self.state.read().values().map(|e| e.faults).sum()
    }
}

fn is_fault(state: HealthState) -> bool {
    matches!(
        state,
        HealthState::Degraded | HealthState::Unresponsive | HealthState::Failed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changed(from: HealthState, to: HealthState) -> MonitorEvent {
        MonitorEvent::new(EventKind::StateChanged)
            .with_subsystem("motor-1")
            .with_transition(from, to)
    }

    #[test]
    fn counts_entries_into_fault_states_once() {
        let ledger = FaultLedger::new();
        assert!(ledger.update(&changed(HealthState::Healthy, HealthState::Degraded)));
        assert!(!ledger.update(&changed(HealthState::Degraded, HealthState::Unresponsive)));
        assert!(!ledger.update(&changed(HealthState::Unresponsive, HealthState::Recovering)));
        assert!(ledger.update(&changed(HealthState::Recovering, HealthState::Failed)));
        assert_eq!(ledger.faults("motor-1"), 2);
        assert_eq!(ledger.total(), 2);
    }

    #[test]
    fn first_event_of_the_process_is_counted() {
        let ledger = FaultLedger::new();
        let mut first = changed(HealthState::Healthy, HealthState::Unresponsive);
        first.seq = 0;
        assert!(ledger.update(&first));
        assert_eq!(ledger.total(), 1);

        let mut replay = changed(HealthState::Healthy, HealthState::Unresponsive);
        replay.seq = 0;
        assert!(!ledger.update(&replay));
        assert_eq!(ledger.total(), 1);
    }

    #[test]
    fn stale_events_are_rejected() {
        let ledger = FaultLedger::new();
        let older = changed(HealthState::Healthy, HealthState::Unresponsive);
        let newer = changed(HealthState::Recovering, HealthState::Healthy);
        assert!(!ledger.update(&newer));
        assert!(!ledger.update(&older));
        assert_eq!(ledger.faults("motor-1"), 0);
    }
}
