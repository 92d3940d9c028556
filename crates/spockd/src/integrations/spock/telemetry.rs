use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::TelemetryConfig;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry sink returned HTTP {0}")]
    Http(u16),

    #[error("telemetry sink unreachable: {0}")]
    Network(#[from] reqwest::Error),
}

/// One power reading as the sink expects it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PowerReading<'a> {
    pub target_id: &'a str,
    pub device_label: &'a str,
    pub sensor_id: &'a str,
    /// Numeric string, exactly as the host reported it
    pub power: &'a str,
}

/// Posts power readings to the telemetry sink
pub struct TelemetryClient {
    client: Client,
    url: String,
    target_id: String,
}

impl TelemetryClient {
    pub fn new(
        config: &TelemetryConfig,
        target_id: impl Into<String>,
        timeout: std::time::Duration,
    ) -> reqwest::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: config.url.clone(),
            target_id: target_id.into(),
        })
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub async fn send(&self, reading: &PowerReading<'_>) -> Result<(), TelemetryError> {
        debug!(
            "Sending telemetry for {}: {} W",
            reading.sensor_id, reading.power
        );

        let response = self.client.post(&self.url).json(reading).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Http(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use serde_json::json;
    use std::time::Duration;

    fn config(url: String) -> TelemetryConfig {
        TelemetryConfig {
            url,
            interval: Duration::from_secs(60),
            sensors: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_send_reading() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/api/iot_telemetry")
            .match_body(Matcher::Json(json!({
                "target_id": "plant-7",
                "device_label": "Heat pump",
                "sensor_id": "sensor.heat_pump_power",
                "power": "1250.5"
            })))
            .with_status(200)
            .create_async()
            .await;

        let client = TelemetryClient::new(
            &config(format!("{}/api/iot_telemetry", server.url())),
            "plant-7",
            Duration::from_secs(5),
        )
        .unwrap();

        client
            .send(&PowerReading {
                target_id: client.target_id(),
                device_label: "Heat pump",
                sensor_id: "sensor.heat_pump_power",
                power: "1250.5",
            })
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_rejected() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/api/iot_telemetry")
            .with_status(502)
            .create_async()
            .await;

        let client = TelemetryClient::new(
            &config(format!("{}/api/iot_telemetry", server.url())),
            "plant-7",
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .send(&PowerReading {
                target_id: "plant-7",
                device_label: "Boiler",
                sensor_id: "sensor.boiler_power",
                power: "0",
            })
            .await
            .unwrap_err();
        assert!(matches!(err, TelemetryError::Http(502)));
    }
}
