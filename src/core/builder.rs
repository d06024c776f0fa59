use std::sync::Arc;

use crate::{
    bus::SharedBus,
    config::MonitorConfig,
    error::ConfigError,
    events::EventBus,
    recovery::{AlertLog, AlertSink, RecoveryMachine, RecoveryPolicy},
    security::{PayloadCipher, Plaintext},
    subscribers::{Subscribe, SubscriberSet},
};

use super::monitor::Monitor;

/// Builder for constructing a [`Monitor`] with optional collaborators.
pub struct MonitorBuilder {
    cfg: MonitorConfig,
    bus: Option<SharedBus>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    sinks: Vec<Arc<dyn AlertSink>>,
    cipher: Arc<dyn PayloadCipher>,
}

impl MonitorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: MonitorConfig) -> Self {
        Self {
            cfg,
            bus: None,
            subscribers: Vec::new(),
            sinks: Vec::new(),
            cipher: Arc::new(Plaintext),
        }
    }

    /// Observes an existing bus instead of creating a fresh one.
    pub fn with_bus(mut self, bus: SharedBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Sets monitor event subscribers.
    ///
    /// Subscribers receive monitor events (transitions, actions, alerts)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds an escalation sink next to the built-in [`AlertLog`].
    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Sets the payload cipher used for telemetry and control payloads.
    ///
    /// Defaults to [`Plaintext`].
    pub fn with_cipher(mut self, cipher: Arc<dyn PayloadCipher>) -> Self {
        self.cipher = cipher;
        self
    }

    /// Validates the configuration and builds the monitor.
    pub fn build(self) -> Result<Arc<Monitor>, ConfigError> {
        self.cfg.validate()?;

        let bus = self.bus.unwrap_or_default();
        let events = EventBus::new(self.cfg.event_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, events.clone()));

        let alerts = Arc::new(AlertLog::with_limit(self.cfg.history_limit));
        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![alerts.clone() as Arc<dyn AlertSink>];
        sinks.extend(self.sinks);

        let machine = RecoveryMachine::new(RecoveryPolicy::from(&self.cfg));

        Ok(Arc::new(Monitor::new_internal(
            self.cfg,
            bus,
            events,
            self.cipher,
            machine,
            alerts,
            sinks,
            subs,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let cfg = MonitorConfig {
            liveness_timeout: Duration::ZERO,
            ..MonitorConfig::default()
        };
        let err = MonitorBuilder::new(cfg).build().err().unwrap();
        assert!(matches!(err, ConfigError::Invalid { field: "liveness_timeout", .. }));
    }

    #[tokio::test]
    async fn shares_an_existing_bus() {
        let bus = SharedBus::new();
        let monitor = MonitorBuilder::new(MonitorConfig::default())
            .with_bus(bus.clone())
            .build()
            .unwrap();
        monitor.register_subsystem("motor-1").unwrap();
        assert!(bus.topics().contains(&"telemetry.motor-1".to_string()));
        assert!(bus.topics().contains(&"control.motor-1".to_string()));
    }
}
