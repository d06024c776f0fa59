//! # healbus
//!
//! **healbus** is a shared topic bus for robotics subsystems with a
//! self-healing health monitor on top of it.
//!
//! Perception, decision and actuation subsystems exchange typed envelopes over
//! bounded topics. The monitor watches the same bus, classifies every subsystem
//! from its telemetry and issues corrective control commands (restart, isolate,
//! throttle) or escalates to an operator, without external intervention.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  perception  │   │   decision   │   │   motor-1    │
//!     │  subsystem   │   │   module     │   │   driver     │
//!     └──────┬───────┘   └──────┬───────┘   └──┬────────▲──┘
//!            │ publish          │ publish      │ publish│ poll
//!            ▼                  ▼              ▼        │ control.motor-1
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  SharedBus (topic rings, per-topic capacity / overwrite policy)   │
//! │  telemetry.<id> · control.<id> · data topics                      │
//! └──────┬──────────────────────────────────────────────▲─────────────┘
//!        │ poll every topic                             │ Restart / Isolate /
//!        ▼                                              │ ThrottleInput
//! ┌──────────────────┐   records    ┌──────────────┐    │
//! │TelemetryCollector├─────────────►│AnomalyDetector│   │
//! │ (single writer)  │              │ (periodic)   │    │
//! └────────▲─────────┘              └──────┬───────┘    │
//!          │ StateChanged (mirror)         │ StateChanged
//!          │                               ▼            │
//! ┌────────┴───────────────────────────────────────────────────────┐
//! │                 EventBus (monitor event stream)                │
//! └────────┬─────────────────────────────────┬─────────────────────┘
//!          ▼                                 ▼
//!  ┌──────────────┐                 ┌─────────────────────┐
//!  │ Orchestrator ├────────────────►│ subscriber_listener │
//!  │ (actions,    │  ActionIssued…  └───┬─────────────┬───┘
//!  │  escalation) ├──► AlertSink        ▼             ▼
//!  └──────────────┘                FaultLedger   SubscriberSet
//!                                                 (per-sub queues)
//! ```
//!
//! ### Health lifecycle
//! ```text
//! Healthy ──(slow / erroring)──► Degraded ──(silent)──► Unresponsive
//!    ▲                              │                       │
//!    │                              └──── Restart issued ───┤
//!    │                                                      ▼
//!    └──(healthy for confirmation_window)──────────── Recovering
//!                                                           │
//!              (recovery_timeout or budget exhausted)       ▼
//!                                       Isolate + alert ─► Failed ──(acknowledge)──► Healthy
//! ```
//!
//! ## Features
//! | Area              | Description                                                      | Key types / traits                          |
//! |-------------------|------------------------------------------------------------------|---------------------------------------------|
//! | **Bus**           | Bounded topics, non-blocking poll, per-sender sequences.         | [`SharedBus`], [`Publisher`], [`Subscription`] |
//! | **Envelopes**     | Typed, sequenced messages and control/telemetry schemas.         | [`Envelope`], [`ControlCommand`], [`TelemetryPayload`] |
//! | **Telemetry**     | Per-subsystem liveness, latency, error rate and loss.            | [`TelemetryCollector`], [`SubsystemRecord`] |
//! | **Detection**     | Ordered rules plus recovery hysteresis.                          | [`HealthClassifier`], [`HealthState`]       |
//! | **Recovery**      | Restart budget, escalation, operator acknowledgment.             | [`RecoveryMachine`], [`Orchestrator`]       |
//! | **Security**      | Payload sealing across trust domains.                            | [`PayloadCipher`], [`SealedBus`]            |
//! | **Subscriber API**| Hook into monitor events (logging, metrics, paging).             | [`Subscribe`]                               |
//! | **Runtime**       | Wiring, graceful shutdown, health report.                        | [`Monitor`], [`HealthReport`]               |
//! | **Configuration** | Centralized policy knobs, TOML loadable.                         | [`MonitorConfig`]                           |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//! - `aes-gcm`: exports the AES-256-GCM payload cipher `AesGcmCipher`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use healbus::{MonitorConfig, Monitor, PayloadKind, TelemetryPayload, telemetry_topic};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let monitor = Monitor::builder(MonitorConfig::default()).build()?;
//!     monitor.register_subsystem("motor-1")?;
//!
//!     let token = CancellationToken::new();
//!     let runner = {
//!         let monitor = monitor.clone();
//!         let token = token.clone();
//!         tokio::spawn(async move { monitor.run(token).await })
//!     };
//!
//!     let motor = monitor.bus().publisher("motor-1");
//!     for _ in 0..5 {
//!         let status = TelemetryPayload::default().latency_us(800).to_bytes()?;
//!         motor.send(&telemetry_topic("motor-1"), PayloadKind::Status, status)?;
//!         tokio::time::sleep(Duration::from_millis(50)).await;
//!     }
//!
//!     token.cancel();
//!     runner.await??;
//!     assert_eq!(monitor.report().subsystems.len(), 1);
//!     Ok(())
//! }
//! ```
mod bus;
mod config;
mod core;
mod detector;
mod envelope;
mod error;
mod events;
mod recovery;
mod security;
mod subscribers;
mod telemetry;

// ---- Public re-exports ----

pub use bus::{
    CursorStats, OverwritePolicy, Poll, Published, Publisher, SharedBus, Subscription,
    TopicConfig, TopicStats,
};
pub use config::MonitorConfig;
pub use core::{HealthReport, Monitor, MonitorBuilder, SubsystemReport};
pub use detector::{
    AnomalyDetector, HealthBoard, HealthClassifier, HealthState, Thresholds, Transition, Verdict,
    classify,
};
pub use envelope::{
    CONTROL_PREFIX, ControlCommand, Envelope, PayloadKind, SchemaError, TELEMETRY_PREFIX,
    TelemetryPayload, control_topic, subsystem_of, telemetry_topic,
};
pub use error::{
    AlertError, BoundaryError, BusError, CipherError, ConfigError, MonitorError, RuntimeError,
};
pub use events::{EventBus, EventKind, MonitorEvent};
pub use recovery::{
    ActionKind, Alert, AlertLog, AlertSink, Effect, ORCHESTRATOR_ID, Orchestrator, Outcome,
    RecoveryAction, RecoveryMachine, RecoveryPolicy, RecoveryStatus, RestartBudget, Severity,
};
pub use security::{PayloadCipher, Plaintext, SealedBus, SessionKey};
pub use subscribers::{Subscribe, SubscriberSet};
pub use telemetry::{LatencyWindow, SubsystemRecord, TelemetryCollector};

// Optional: AES-256-GCM payload cipher.
// Enable with: `--features aes-gcm`
#[cfg(feature = "aes-gcm")]
pub use security::AesGcmCipher;

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
