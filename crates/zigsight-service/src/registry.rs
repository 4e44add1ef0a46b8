//! Device registry telemetry source.
//!
//! Polls an HTTP endpoint describing every device known to a Zigbee
//! coordinator and yields one device update per entry. The endpoint returns
//! a JSON object keyed by IEEE address:
//!
//! ```json
//! {
//!   "0x00158d0001a2b3c4": {
//!     "name": "Hall sensor",
//!     "lqi": 180,
//!     "rssi": -62,
//!     "battery": 91,
//!     "last_seen": "2024-05-01T12:00:00Z",
//!     "power_source": "Battery"
//!   }
//! }
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, warn};

use zigsight_core::{Error, Result, TelemetrySource, TelemetryUpdate};

use crate::config::RegistryConfig;

/// Request timeout for a single registry poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One device as reported by the registry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RegistryDevice {
    pub name: Option<String>,
    pub lqi: Option<f64>,
    pub rssi: Option<f64>,
    pub battery: Option<f64>,
    pub last_seen: Option<String>,
    pub power_source: Option<String>,
}

impl RegistryDevice {
    /// Translate the entry into the payload shape the store understands.
    pub fn into_payload(self) -> Map<String, Value> {
        let mut payload = Map::new();
        if let Some(name) = self.name.filter(|n| !n.is_empty()) {
            payload.insert("friendly_name".to_string(), json!(name));
        }
        if let Some(lqi) = self.lqi {
            payload.insert("link_quality".to_string(), json!(lqi));
        }
        if let Some(rssi) = self.rssi {
            payload.insert("rssi".to_string(), json!(rssi));
        }
        if let Some(battery) = self.battery {
            payload.insert("battery".to_string(), json!(battery));
        }
        if let Some(last_seen) = self.last_seen {
            payload.insert("last_seen".to_string(), json!(last_seen));
        }
        if let Some(power_source) = self.power_source {
            payload.insert("power_source".to_string(), json!(power_source));
        }
        payload
    }
}

/// Convert a registry response into device updates, in response order.
pub fn parse_registry(body: &[u8]) -> Result<Vec<TelemetryUpdate>> {
    let devices: IndexMap<String, RegistryDevice> = serde_json::from_slice(body)?;
    Ok(devices
        .into_iter()
        .map(|(ieee, device)| TelemetryUpdate::Device {
            device_id: ieee,
            payload: device.into_payload(),
        })
        .collect())
}

/// Telemetry source polling a device registry.
pub struct RegistrySource {
    client: reqwest::Client,
    url: String,
    timer: Interval,
    pending: VecDeque<TelemetryUpdate>,
    consecutive_failures: u32,
}

impl RegistrySource {
    /// Create a source for the configured registry.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::invalid_config(format!("Failed to build HTTP client: {}", e)))?;

        let mut timer = interval(Duration::from_secs(config.poll_interval.max(1)));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            client,
            url: config.url.clone(),
            timer,
            pending: VecDeque::new(),
            consecutive_failures: 0,
        })
    }

    async fn poll(&self) -> Result<Vec<TelemetryUpdate>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::source_failed("registry", e.to_string()))?;
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::source_failed("registry", e.to_string()))?;
        parse_registry(&body)
    }
}

#[async_trait]
impl TelemetrySource for RegistrySource {
    fn name(&self) -> &str {
        "registry"
    }

    async fn next_update(&mut self) -> Result<Option<TelemetryUpdate>> {
        loop {
            if let Some(update) = self.pending.pop_front() {
                return Ok(Some(update));
            }

            self.timer.tick().await;

            match self.poll().await {
                Ok(updates) => {
                    self.consecutive_failures = 0;
                    debug!("Registry returned {} device(s)", updates.len());
                    self.pending.extend(updates);
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    if self.consecutive_failures <= 3 {
                        warn!(
                            "Failed to poll registry {}: {} (attempt {})",
                            self.url, e, self.consecutive_failures
                        );
                    } else if self.consecutive_failures == 4 {
                        error!(
                            "Failed to poll registry {} after {} attempts, will continue trying silently",
                            self.url, self.consecutive_failures
                        );
                    }
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_response() {
        let body = br#"{
            "0x0002": {"name": "Hall sensor", "lqi": 180, "battery": 91, "power_source": "Battery"},
            "0x0001": {"lqi": 255, "rssi": -40}
        }"#;

        let updates = parse_registry(body).unwrap();
        assert_eq!(updates.len(), 2);

        match &updates[0] {
            TelemetryUpdate::Device { device_id, payload } => {
                assert_eq!(device_id, "0x0002");
                assert_eq!(payload["friendly_name"], json!("Hall sensor"));
                assert_eq!(payload["link_quality"], json!(180.0));
                assert_eq!(payload["battery"], json!(91.0));
                assert_eq!(payload["power_source"], json!("Battery"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
        match &updates[1] {
            TelemetryUpdate::Device { device_id, payload } => {
                assert_eq!(device_id, "0x0001");
                assert!(!payload.contains_key("battery"));
                assert!(!payload.contains_key("friendly_name"));
            }
            other => panic!("unexpected update: {other:?}"),
        }
    }

    #[test]
    fn test_parse_registry_empty_name_is_dropped() {
        let updates = parse_registry(br#"{"0x01": {"name": ""}}"#).unwrap();
        let TelemetryUpdate::Device { payload, .. } = &updates[0] else {
            panic!("expected a device update");
        };
        assert!(payload.is_empty());
    }

    #[test]
    fn test_parse_registry_rejects_non_object() {
        assert!(parse_registry(b"[1, 2, 3]").is_err());
        assert!(parse_registry(b"not json").is_err());
    }

    #[test]
    fn test_registry_payload_feeds_store() {
        let mut store = zigsight_core::DeviceStore::default();
        for update in parse_registry(br#"{"0x01": {"name": "Plug", "lqi": 200}}"#).unwrap() {
            store.apply(update);
        }
        let device = store.get_device("0x01").unwrap();
        assert_eq!(device.friendly_name, "Plug");
        assert_eq!(device.metrics.link_quality, Some(200.0));
    }

    #[tokio::test]
    async fn test_registry_source_name() {
        let source = RegistrySource::new(&RegistryConfig::default()).unwrap();
        assert_eq!(source.name(), "registry");
    }
}
