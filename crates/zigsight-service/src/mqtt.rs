//! Zigbee2MQTT telemetry source.
//!
//! Subscribes to a Zigbee2MQTT broker and turns its messages into
//! [`TelemetryUpdate`]s.
//!
//! # Topic Structure
//!
//! - `{prefix}/bridge/state` - Bridge state (`online`/`offline`, plain or JSON)
//! - `{prefix}/{device}` - Device state as a JSON object
//!
//! Where `{prefix}` is configurable (default: "zigbee2mqtt"). Deeper topics
//! such as `{prefix}/{device}/set` are not subscribed to.
//!
//! # Example Configuration
//!
//! ```toml
//! [source]
//! kind = "zigbee2mqtt"
//!
//! [mqtt]
//! broker = "mqtt://localhost:1883"
//! topic_prefix = "zigbee2mqtt"
//! ```
//!
//! # Reconnection
//!
//! The client automatically reconnects if the connection is lost and
//! subscribes again on every new session. Connection errors are logged and
//! never end the stream.

use std::time::Duration;

use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use serde_json::Value;
use tracing::{debug, info, warn};

use zigsight_core::payload::parse_object;
use zigsight_core::{Error, Result, TelemetrySource, TelemetryUpdate};
use zigsight_types::BRIDGE_DEVICE_ID;

use crate::config::MqttConfig;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Telemetry source reading Zigbee2MQTT messages from a broker.
pub struct Zigbee2MqttSource {
    client: AsyncClient,
    eventloop: EventLoop,
    prefix: String,
}

impl Zigbee2MqttSource {
    /// Create a source for the configured broker.
    ///
    /// Nothing is sent until [`next_update`](TelemetrySource::next_update) is
    /// first polled.
    pub fn new(config: &MqttConfig) -> Result<Self> {
        let (host, port, use_tls) = parse_broker_url(&config.broker)
            .map_err(|e| Error::invalid_config(format!("Invalid MQTT broker URL: {}", e)))?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            mqtt_options.set_credentials(username, password);
        }

        if use_tls {
            mqtt_options.set_transport(rumqttc::Transport::tls_with_config(
                rumqttc::TlsConfiguration::Native,
            ));
        }

        let (client, eventloop) = AsyncClient::new(mqtt_options, 100);

        info!(
            "MQTT source configured for {} with prefix '{}'",
            config.broker, config.topic_prefix
        );

        Ok(Self {
            client,
            eventloop,
            prefix: config.topic_prefix.trim_matches('/').to_string(),
        })
    }

    /// Topics subscribed on every connection.
    pub fn topics(&self) -> [String; 2] {
        [
            format!("{}/bridge/state", self.prefix),
            format!("{}/+", self.prefix),
        ]
    }

    fn subscribe(&self) {
        for topic in self.topics() {
            if let Err(e) = self.client.try_subscribe(&topic, QoS::AtLeastOnce) {
                warn!("Failed to subscribe to {}: {}", topic, e);
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for Zigbee2MqttSource {
    fn name(&self) -> &str {
        "zigbee2mqtt"
    }

    async fn next_update(&mut self) -> Result<Option<TelemetryUpdate>> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("MQTT connected: {:?}", ack);
                    self.subscribe();
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if let Some(update) =
                        route_message(&self.prefix, &publish.topic, &publish.payload)
                    {
                        return Ok(Some(update));
                    }
                }
                Ok(Event::Incoming(Packet::PingResp)) => {
                    debug!("MQTT ping response received");
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("MQTT connection error: {}. Reconnecting...", e);
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.client.try_disconnect() {
            debug!("Error disconnecting MQTT client: {}", e);
            return Ok(());
        }

        // Drive the event loop until the disconnect packet is flushed.
        let flush = async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(Duration::from_secs(1), flush)
            .await
            .is_err()
        {
            debug!("Timed out flushing MQTT disconnect");
        }

        info!("MQTT source closed");
        Ok(())
    }
}

/// Map a publish on `topic` to a telemetry update.
///
/// Returns `None` for topics outside the prefix, nested topics other than
/// `bridge/state`, and device payloads that are not JSON objects.
pub fn route_message(prefix: &str, topic: &str, payload: &[u8]) -> Option<TelemetryUpdate> {
    let rest = topic.strip_prefix(prefix)?.strip_prefix('/')?;

    if rest == "bridge/state" {
        let state = serde_json::from_slice(payload)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(payload).trim().to_string()));
        return Some(TelemetryUpdate::Bridge { state });
    }

    if rest.is_empty() || rest.contains('/') || rest == BRIDGE_DEVICE_ID {
        return None;
    }

    match parse_object(payload) {
        Ok(payload) => Some(TelemetryUpdate::Device {
            device_id: rest.to_string(),
            payload,
        }),
        Err(e) => {
            warn!("Skipping malformed payload on {}: {}", topic, e);
            None
        }
    }
}

/// Parse an MQTT broker URL into (host, port, use_tls).
pub fn parse_broker_url(url: &str) -> std::result::Result<(String, u16, bool), String> {
    let (use_tls, rest) = if let Some(stripped) = url.strip_prefix("mqtt://") {
        (false, stripped)
    } else if let Some(stripped) = url.strip_prefix("mqtts://") {
        (true, stripped)
    } else {
        return Err("Invalid scheme: URL must start with mqtt:// or mqtts://".to_string());
    };

    let default_port = if use_tls { 8883 } else { 1883 };

    let (host, port) = if let Some((h, p)) = rest.rsplit_once(':') {
        let port = p
            .parse::<u16>()
            .map_err(|_| format!("Invalid port: {}", p))?;
        (h.to_string(), port)
    } else {
        (rest.to_string(), default_port)
    };

    if host.is_empty() {
        return Err("Host cannot be empty".to_string());
    }

    Ok((host, port, use_tls))
}
