//! # Monitor events emitted by the detector, the orchestrator and the runtime.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Health events**: detector state transitions
//! - **Recovery events**: action lifecycle (issued, succeeded, failed), budget, alerts
//! - **Subscriber events**: overflow and panics of event subscribers
//! - **Runtime events**: shutdown flow
//!
//! The [`MonitorEvent`] struct carries the metadata: subsystem, state pair,
//! action kind and id, severity and reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use healbus::{EventKind, HealthState, MonitorEvent};
//!
//! let ev = MonitorEvent::new(EventKind::StateChanged)
//!     .with_subsystem("motor-1")
//!     .with_transition(HealthState::Healthy, HealthState::Unresponsive)
//!     .with_reason("silent for 350ms");
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.subsystem.as_deref(), Some("motor-1"));
//! assert_eq!(ev.to, Some(HealthState::Unresponsive));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::detector::HealthState;
use crate::recovery::{ActionKind, Severity};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of monitor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Health events ===
    /// Detector moved a subsystem to a new health state.
    ///
    /// Sets:
    /// - `subsystem`: subsystem id
    /// - `from`, `to`: previous and new state
    /// - `reason`: triggering rule
    StateChanged,

    // === Recovery events ===
    /// Orchestrator issued an action.
    ///
    /// Sets:
    /// - `subsystem`: target
    /// - `action`, `action_id`: kind and id
    /// - `reason`: why it was issued
    ActionIssued,

    /// An action completed as intended.
    ///
    /// Sets: `subsystem`, `action`, `action_id`, `reason`
    ActionSucceeded,

    /// An action timed out, could not be delivered, or was superseded.
    ///
    /// Sets: `subsystem`, `action`, `action_id`, `reason`
    ActionFailed,

    /// A restart was refused because the budget is spent.
    ///
    /// Sets:
    /// - `subsystem`: target
    /// - `reason`: budget error message
    BudgetExceeded,

    /// An alert was delivered to the alert sinks.
    ///
    /// Sets: `subsystem`, `severity`, `reason`
    AlertRaised,

    /// An operator acknowledged a subsystem.
    ///
    /// Sets: `subsystem`
    Acknowledged,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `subsystem`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `subsystem`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Runtime events ===
    /// Shutdown requested (token cancelled or OS signal observed).
    ShutdownRequested,

    /// All components stopped within the configured grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some components did not stop in time.
    GraceExceeded,
}

/// Monitor event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct MonitorEvent {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Subsystem (or subscriber) the event is about.
    pub subsystem: Option<Arc<str>>,
    /// Previous health state.
    pub from: Option<HealthState>,
    /// New health state.
    pub to: Option<HealthState>,
    /// Action kind.
    pub action: Option<ActionKind>,
    /// Action id.
    pub action_id: Option<u64>,
    /// Alert severity.
    pub severity: Option<Severity>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl MonitorEvent {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subsystem: None,
            from: None,
            to: None,
            action: None,
            action_id: None,
            severity: None,
            reason: None,
        }
    }

    /// Attaches a subsystem id.
    #[inline]
    pub fn with_subsystem(mut self, subsystem: impl Into<Arc<str>>) -> Self {
        self.subsystem = Some(subsystem.into());
        self
    }

    /// Attaches a state transition.
    #[inline]
    pub fn with_transition(mut self, from: HealthState, to: HealthState) -> Self {
        self.from = Some(from);
        self.to = Some(to);
        self
    }

    /// Attaches an action kind and id.
    #[inline]
    pub fn with_action(mut self, kind: ActionKind, id: u64) -> Self {
        self.action = Some(kind);
        self.action_id = Some(id);
        self
    }

    /// Attaches an alert severity.
    #[inline]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        MonitorEvent::new(EventKind::SubscriberOverflow)
            .with_subsystem(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        MonitorEvent::new(EventKind::SubscriberPanicked)
            .with_subsystem(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }

    /// True when this event is `kind` about `subsystem`.
    #[inline]
    pub fn is(&self, kind: EventKind, subsystem: &str) -> bool {
        self.kind == kind && self.subsystem.as_deref() == Some(subsystem)
    }
}
