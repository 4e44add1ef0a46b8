//! Telemetry collector and HTTP REST API for Zigbee mesh analytics.
//!
//! This crate provides a service that:
//! - Subscribes to Zigbee2MQTT or polls a device registry
//! - Feeds every message into an in-memory device store
//! - Exposes device state, analytics and topology over a REST API
//! - Streams device events to WebSocket clients
//! - Recommends a Zigbee channel from Wi-Fi scan results
//!
//! # REST API Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Collector status
//! - `GET /api/devices` - All tracked devices
//! - `GET /api/devices/{id}` - Device record
//! - `GET /api/devices/{id}/metrics` - Current metrics
//! - `GET /api/devices/{id}/history` - Metric history
//! - `GET /api/devices/{id}/analytics` - Freshly computed analytics
//! - `GET /api/bridge` - Last bridge state
//! - `GET /api/topology` - Mesh topology graph
//! - `GET /api/analytics/overview` - Network summary
//! - `GET /api/analytics/trends` - Metric series for one device
//! - `GET /api/analytics/export` - JSON or CSV export
//! - `GET /api/diagnostics` - Redacted diagnostics dump
//! - `GET|POST /api/recommendation` - Channel recommendations
//! - `WS /api/ws` - Device snapshot followed by live events
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/zigsight/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [source]
//! kind = "zigbee2mqtt"
//!
//! [mqtt]
//! broker = "mqtt://localhost:1883"
//! topic_prefix = "zigbee2mqtt"
//!
//! [analytics]
//! reconnect_rate_threshold = 5.0
//! battery_drain_threshold = 10.0
//! ```

pub mod api;
pub mod collector;
pub mod config;
pub mod registry;
pub mod state;
pub mod ws;

pub use collector::{Collector, CollectorError};
pub use config::{
    AdvisorConfig, Config, ConfigError, MqttConfig, RegistryConfig, ServerConfig, SourceConfig,
    SourceKind, ValidationError,
};
pub use registry::RegistrySource;
pub use state::AppState;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "mqtt")]
pub use mqtt::Zigbee2MqttSource;
