//! # LogWriter: monitor events as structured log lines
//!
//! A minimal subscriber that forwards incoming [`MonitorEvent`]s to `tracing`
//! under the `healbus::events` target. Use it for tests or demos.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO healbus::events: [state] subsystem="motor-1" from=healthy to=unresponsive reason="silent for 350ms"
//! INFO healbus::events: [issued] subsystem="motor-1" action=restart id=1
//! INFO healbus::events: [succeeded] subsystem="motor-1" action=restart id=1
//! WARN healbus::events: [budget-exceeded] subsystem="motor-1" reason="..."
//! ```

use async_trait::async_trait;
use tracing::{info, warn};

use crate::events::{EventKind, MonitorEvent};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &MonitorEvent) {
        let subsystem = e.subsystem.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");
        let action = e.action.map(|a| a.as_str()).unwrap_or("-");
        let id = e.action_id.unwrap_or_default();
        match e.kind {
            EventKind::StateChanged => {
                let from = e.from.map(|s| s.as_str()).unwrap_or("-");
                let to = e.to.map(|s| s.as_str()).unwrap_or("-");
                info!(target: "healbus::events", "[state] subsystem={subsystem:?} from={from} to={to} reason={reason:?}");
            }
            EventKind::ActionIssued => {
                info!(target: "healbus::events", "[issued] subsystem={subsystem:?} action={action} id={id} reason={reason:?}");
            }
            EventKind::ActionSucceeded => {
                info!(target: "healbus::events", "[succeeded] subsystem={subsystem:?} action={action} id={id}");
            }
            EventKind::ActionFailed => {
                warn!(target: "healbus::events", "[failed] subsystem={subsystem:?} action={action} id={id} reason={reason:?}");
            }
            EventKind::BudgetExceeded => {
                warn!(target: "healbus::events", "[budget-exceeded] subsystem={subsystem:?} reason={reason:?}");
            }
            EventKind::AlertRaised => {
                let severity = e.severity.map(|s| s.as_str()).unwrap_or("-");
                warn!(target: "healbus::events", "[alert] subsystem={subsystem:?} severity={severity} reason={reason:?}");
            }
            EventKind::Acknowledged => {
                info!(target: "healbus::events", "[acknowledged] subsystem={subsystem:?}");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "healbus::events", "[subscriber-overflow] subscriber={subsystem} reason={reason:?}");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "healbus::events", "[subscriber-panicked] subscriber={subsystem} info={reason}");
            }
            EventKind::ShutdownRequested => info!(target: "healbus::events", "[shutdown-requested]"),
            EventKind::AllStoppedWithin => info!(target: "healbus::events", "[all-stopped-within-grace]"),
            EventKind::GraceExceeded => warn!(target: "healbus::events", "[grace-exceeded]"),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::HealthState;

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn state_changes_are_logged() {
        LogWriter::new()
            .on_event(
                &MonitorEvent::new(EventKind::StateChanged)
                    .with_subsystem("motor-1")
                    .with_transition(HealthState::Healthy, HealthState::Unresponsive),
            )
            .await;
        assert!(logs_contain("[state] subsystem=\"motor-1\" from=healthy to=unresponsive"));
    }
}
