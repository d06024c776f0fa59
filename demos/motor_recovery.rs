//! # Example: motor recovery
//!
//! A motor driver publishes status telemetry, stalls, and is brought back by the
//! monitor's restart command. A second driver stalls again after every restart
//! until its budget is spent and it gets isolated.
//!
//! Run with:
//! ```bash
//! RUST_LOG=info,healbus=debug cargo run --example motor_recovery --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use healbus::{
    ActionKind, ControlCommand, LogWriter, Monitor, MonitorConfig, PayloadKind, Poll, SharedBus,
    Subscribe, TelemetryPayload, control_topic, telemetry_topic,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Publishes status every 50 ms; stalls for good once `stall_after` elapsed,
/// and resumes on every `Restart` (stalling again after `stall_after` when `relapse`).
async fn motor(bus: SharedBus, id: &'static str, stall_after: Duration, relapse: bool, token: CancellationToken) {
    let Ok(control) = bus.subscribe(&control_topic(id)) else {
        warn!(subsystem = id, "control topic missing");
        return;
    };
    let publisher = bus.publisher(id);
    let mut stall_at = Some(Instant::now() + stall_after);
    let mut running = true;
    let mut tick = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
        }
        if running && stall_at.is_some_and(|at| Instant::now() >= at) {
            info!(subsystem = id, "motor stalled");
            running = false;
        }
        if running {
            let status = TelemetryPayload::with_metrics(serde_json::json!({ "rpm": 1200 }))
                .latency_us(2_500)
                .to_bytes();
            if let Ok(status) = status {
                let _ = publisher.send(&telemetry_topic(id), PayloadKind::Status, status);
            }
        }
        while let Poll::Ready(env) = bus.poll(&control) {
            let Ok(cmd) = ControlCommand::from_bytes(&env.payload) else {
                continue;
            };
            info!(subsystem = id, action = cmd.action.as_str(), reason = ?cmd.reason, "control command received");
            match cmd.action {
                ActionKind::Restart => {
                    running = true;
                    stall_at = relapse.then(|| Instant::now() + stall_after);
                }
                ActionKind::Isolate => running = false,
                _ => {}
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();

    let cfg = MonitorConfig {
        confirmation_window: Duration::from_millis(300),
        recovery_timeout: Duration::from_secs(2),
        max_restarts: 2,
        ..MonitorConfig::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let monitor = Monitor::builder(cfg).with_subscribers(subs).build()?;
    monitor.register_subsystem("motor-1")?;
    monitor.register_subsystem("motor-2")?;

    let token = CancellationToken::new();
    let bus = monitor.bus().clone();
    tokio::spawn(motor(bus.clone(), "motor-1", Duration::from_secs(1), false, token.clone()));
    tokio::spawn(motor(bus, "motor-2", Duration::from_millis(800), true, token.clone()));

    let stop = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(8)).await;
        stop.cancel();
    });

    monitor.run(token).await?;

    let report = monitor.report();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
