use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use super::host::Host;
use crate::config::PowerSensor;
use crate::integrations::spock::{PowerReading, TelemetryClient};

fn is_numeric(raw: &str) -> bool {
    raw.trim().parse::<f64>().is_ok_and(f64::is_finite)
}

/// Read every sensor once and post the numeric ones
///
/// Returns how many readings the sink accepted. Nothing here fails the caller.
pub async fn report_once(host: &dyn Host, client: &TelemetryClient, sensors: &[PowerSensor]) -> usize {
    let mut sent = 0;

    for sensor in sensors {
        let raw = match host.get_state(&sensor.sensor_id).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!("Power sensor '{}' not found", sensor.sensor_id);
                continue;
            }
            Err(e) => {
                warn!("Failed to read power sensor '{}': {}", sensor.sensor_id, e);
                continue;
            }
        };

        if !is_numeric(&raw) {
            debug!(
                "Power sensor '{}' is '{}', not numeric; skipping",
                sensor.sensor_id, raw
            );
            continue;
        }

        let reading = PowerReading {
            target_id: client.target_id(),
            device_label: &sensor.device_label,
            sensor_id: &sensor.sensor_id,
            power: raw.trim(),
        };

        match client.send(&reading).await {
            Ok(()) => sent += 1,
            Err(e) => warn!("Telemetry for '{}' not delivered: {}", sensor.sensor_id, e),
        }
    }

    sent
}

/// Post readings every `interval` until aborted
pub fn spawn(
    name: String,
    host: Arc<dyn Host>,
    client: TelemetryClient,
    sensors: Vec<PowerSensor>,
    interval: Duration,
    first_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + first_delay, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let sent = report_once(host.as_ref(), &client, &sensors).await;
            debug!("[{}] Sent {}/{} power readings", name, sent, sensors.len());
        }
    })
}
