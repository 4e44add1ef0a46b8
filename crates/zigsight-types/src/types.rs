//! Core data model for Zigbee mesh telemetry and analytics.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Device id reserved for the Zigbee bridge (coordinator gateway).
pub const BRIDGE_DEVICE_ID: &str = "bridge";

/// Id of the coordinator node synthesized when no device declares itself one.
pub const SYNTHETIC_COORDINATOR_ID: &str = "coordinator";

/// Parse an RFC 3339 timestamp.
///
/// ```
/// use zigsight_types::parse_timestamp;
///
/// assert!(parse_timestamp("2024-05-01T12:00:00Z").is_ok());
/// assert!(parse_timestamp("yesterday").is_err());
/// ```
pub fn parse_timestamp(s: &str) -> ParseResult<OffsetDateTime> {
    OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
        .map_err(|e| ParseError::InvalidValue(format!("timestamp '{}': {}", s, e)))
}

/// Point-in-time metrics extracted from one telemetry message.
///
/// The raw message is kept alongside the normalized fields so that
/// consumers such as the topology builder can read device-declared
/// attributes (`type`, `parent_ieee`) without re-parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Link quality indicator, 0-255.
    pub link_quality: Option<f64>,
    /// Battery level in percent, 0-100.
    pub battery: Option<f64>,
    /// Supply voltage as reported by the device.
    pub voltage: Option<f64>,
    /// When the message producing this snapshot was received.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    /// The raw payload of the last message.
    #[serde(default)]
    pub last_message: Map<String, Value>,
}

impl MetricsSnapshot {
    /// Read a string attribute from the raw message.
    #[must_use]
    pub fn message_str(&self, key: &str) -> Option<&str> {
        self.last_message.get(key).and_then(Value::as_str)
    }

    /// The node role declared by the device in its last message.
    #[must_use]
    pub fn declared_node_type(&self) -> NodeType {
        NodeType::from_declared(self.message_str("type"))
    }

    /// The parent address declared by the device, if any.
    #[must_use]
    pub fn parent_ieee(&self) -> Option<&str> {
        self.message_str("parent_ieee").filter(|p| !p.is_empty())
    }
}

/// A timestamped metrics snapshot in a device's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the entry was recorded.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// The metrics recorded at that time.
    pub metrics: MetricsSnapshot,
}

impl HistoryEntry {
    /// Create a new history entry.
    pub fn new(timestamp: OffsetDateTime, metrics: MetricsSnapshot) -> Self {
        Self { timestamp, metrics }
    }
}

/// Derived reliability analytics for a single device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsResult {
    /// Inferred reconnect events per hour.
    pub reconnect_rate: f64,
    /// Battery change in percent per hour (negative means draining).
    pub battery_trend: Option<f64>,
    /// Composite health score, 0-100.
    pub health_score: f64,
    /// Whether the battery is draining faster than the configured threshold.
    pub battery_drain_warning: bool,
    /// Whether the device reconnects too often or has gone quiet.
    pub connectivity_warning: bool,
}

/// Authoritative state of one Zigbee device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Device identifier (friendly name topic or IEEE address).
    pub device_id: String,
    /// Human readable name.
    pub friendly_name: String,
    /// When the first message from this device arrived.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
    /// When the record was last updated.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    /// Number of inferred reconnects since first seen.
    pub reconnect_count: u32,
    /// When the last reconnect was inferred.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_reconnect: Option<OffsetDateTime>,
    /// Current metrics.
    pub metrics: MetricsSnapshot,
    /// Analytics computed on the last update.
    #[serde(default)]
    pub analytics: Option<AnalyticsResult>,
}

impl DeviceRecord {
    /// Create a record for a device seen for the first time.
    pub fn new(device_id: impl Into<String>, now: OffsetDateTime) -> Self {
        let device_id = device_id.into();
        Self {
            friendly_name: device_id.clone(),
            device_id,
            first_seen: now,
            last_update: now,
            reconnect_count: 0,
            last_reconnect: None,
            metrics: MetricsSnapshot::default(),
            analytics: None,
        }
    }
}

/// Last state message published by the Zigbee bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeState {
    /// Raw state payload (`"online"` or an object such as `{"state": "online"}`).
    pub state: Value,
    /// When the state was received.
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
}

impl BridgeState {
    /// The bridge state as a plain string, if it can be read as one.
    #[must_use]
    pub fn state_str(&self) -> Option<&str> {
        match &self.state {
            Value::String(s) => Some(s),
            Value::Object(map) => map.get("state").and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Role of a node in the Zigbee mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Network coordinator.
    Coordinator,
    /// Mains-powered router that relays traffic.
    Router,
    /// Leaf device.
    EndDevice,
}

impl NodeType {
    /// Classify a node from the `type` attribute a device declares.
    ///
    /// ```
    /// use zigsight_types::NodeType;
    ///
    /// assert_eq!(NodeType::from_declared(Some("Router")), NodeType::Router);
    /// assert_eq!(NodeType::from_declared(Some("Coordinator")), NodeType::Coordinator);
    /// assert_eq!(NodeType::from_declared(Some("EndDevice")), NodeType::EndDevice);
    /// assert_eq!(NodeType::from_declared(None), NodeType::EndDevice);
    /// ```
    #[must_use]
    pub fn from_declared(declared: Option<&str>) -> Self {
        match declared {
            Some("Router") => NodeType::Router,
            Some("Coordinator") => NodeType::Coordinator,
            _ => NodeType::EndDevice,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Coordinator => write!(f, "coordinator"),
            NodeType::Router => write!(f, "router"),
            NodeType::EndDevice => write!(f, "end_device"),
        }
    }
}

/// Analytics shown on a topology node. All fields are absent for nodes
/// without cached analytics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeAnalytics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_trend: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_drain_warning: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connectivity_warning: Option<bool>,
}

impl From<&AnalyticsResult> for NodeAnalytics {
    fn from(result: &AnalyticsResult) -> Self {
        Self {
            reconnect_rate: Some(result.reconnect_rate),
            battery_trend: result.battery_trend,
            battery_drain_warning: Some(result.battery_drain_warning),
            connectivity_warning: Some(result.connectivity_warning),
        }
    }
}

/// A node in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeView {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub link_quality: Option<f64>,
    pub battery: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub health_score: Option<f64>,
    pub analytics: NodeAnalytics,
}

/// A parent to child link in the topology graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyEdge {
    pub from: String,
    pub to: String,
    pub link_quality: Option<f64>,
}

/// Node and edge view of the mesh, ready for visualization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyGraph {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<TopologyEdge>,
    pub device_count: usize,
    pub coordinator_count: usize,
    pub router_count: usize,
    pub end_device_count: usize,
}

impl TopologyGraph {
    /// Edges whose parent does not match any node id.
    ///
    /// Devices frequently report their parent by IEEE address while nodes
    /// are keyed by friendly name, so these are reported rather than removed.
    pub fn dangling_edges(&self) -> impl Iterator<Item = &TopologyEdge> {
        self.edges
            .iter()
            .filter(|edge| !self.nodes.iter().any(|node| node.id == edge.from))
    }

    /// Find a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeView> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// A Wi-Fi access point observed on the 2.4 GHz band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiAccessPoint {
    /// Wi-Fi channel, 1-14. `0` when the scan did not report one.
    #[serde(default, deserialize_with = "channel_or_unknown")]
    pub channel: u8,
    /// Signal strength in dBm.
    #[serde(default)]
    pub rssi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
}

impl WifiAccessPoint {
    /// Create an access point with a known signal strength.
    pub fn new(channel: u8, rssi: f64) -> Self {
        Self {
            channel,
            rssi: Some(rssi),
            ssid: None,
        }
    }

    /// Set the network name.
    #[must_use]
    pub fn with_ssid(mut self, ssid: impl Into<String>) -> Self {
        self.ssid = Some(ssid.into());
        self
    }
}

/// A missing or `null` channel reads as `0`, which matches no Wi-Fi channel.
fn channel_or_unknown<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u8>::deserialize(deserializer)?.unwrap_or(0))
}

/// Result of a Zigbee channel recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelRecommendation {
    /// Recommended Zigbee channel.
    pub recommended_channel: u8,
    /// Interference score per candidate channel, 0-100 (lower is better).
    pub scores: BTreeMap<u8, f64>,
    /// Human readable explanation.
    pub explanation: String,
}

/// Flat per-device row used for JSON and CSV export.
///
/// Field order is the column order of the CSV header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecord {
    pub device_id: String,
    pub friendly_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub last_update: OffsetDateTime,
    pub link_quality: Option<f64>,
    pub battery: Option<f64>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_seen: Option<OffsetDateTime>,
    pub health_score: Option<f64>,
    pub reconnect_rate: Option<f64>,
    pub battery_trend: Option<f64>,
    pub battery_drain_warning: Option<bool>,
    pub connectivity_warning: Option<bool>,
    pub reconnect_count: u32,
}

impl ExportRecord {
    /// Column names in export order.
    pub const FIELDS: [&'static str; 12] = [
        "device_id",
        "friendly_name",
        "last_update",
        "link_quality",
        "battery",
        "last_seen",
        "health_score",
        "reconnect_rate",
        "battery_trend",
        "battery_drain_warning",
        "connectivity_warning",
        "reconnect_count",
    ];
}

impl From<&DeviceRecord> for ExportRecord {
    fn from(device: &DeviceRecord) -> Self {
        let analytics = device.analytics.as_ref();
        Self {
            device_id: device.device_id.clone(),
            friendly_name: device.friendly_name.clone(),
            last_update: device.last_update,
            link_quality: device.metrics.link_quality,
            battery: device.metrics.battery,
            last_seen: device.metrics.last_seen,
            health_score: analytics.map(|a| a.health_score),
            reconnect_rate: analytics.map(|a| a.reconnect_rate),
            battery_trend: analytics.and_then(|a| a.battery_trend),
            battery_drain_warning: analytics.map(|a| a.battery_drain_warning),
            connectivity_warning: analytics.map(|a| a.connectivity_warning),
            reconnect_count: device.reconnect_count,
        }
    }
}

/// Metric that can be charted over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendMetric {
    HealthScore,
    Battery,
    LinkQuality,
    ReconnectRate,
}

impl TrendMetric {
    /// All supported metrics.
    pub const ALL: [TrendMetric; 4] = [
        TrendMetric::HealthScore,
        TrendMetric::Battery,
        TrendMetric::LinkQuality,
        TrendMetric::ReconnectRate,
    ];

    /// The wire name of the metric.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendMetric::HealthScore => "health_score",
            TrendMetric::Battery => "battery",
            TrendMetric::LinkQuality => "link_quality",
            TrendMetric::ReconnectRate => "reconnect_rate",
        }
    }
}

impl fmt::Display for TrendMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrendMetric {
    type Err = ParseError;

    /// Parse a metric name.
    ///
    /// ```
    /// use zigsight_types::TrendMetric;
    ///
    /// assert_eq!("battery".parse::<TrendMetric>().unwrap(), TrendMetric::Battery);
    /// assert!("temperature".parse::<TrendMetric>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TrendMetric::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| ParseError::UnknownMetric(s.to_string()))
    }
}

/// One sample of a metric trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub value: f64,
}

/// Summary of a device's stored history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub entry_count: usize,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub oldest_entry: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub newest_entry: Option<OffsetDateTime>,
}

impl HistorySummary {
    /// Summarize a chronologically ordered history.
    pub fn of(history: &[HistoryEntry]) -> Self {
        Self {
            entry_count: history.len(),
            oldest_entry: history.first().map(|entry| entry.timestamp),
            newest_entry: history.last().map(|entry| entry.timestamp),
        }
    }
}

/// A device record prepared for a diagnostics dump.
///
/// The raw last message may carry user data and is not included; only the
/// names of its attributes are kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceDiagnostics {
    #[serde(flatten)]
    pub device: DeviceRecord,
    /// Attribute names of the redacted last message.
    pub redacted_attributes: Vec<String>,
    pub history: HistorySummary,
}

impl DeviceDiagnostics {
    /// Build diagnostics for `device`, stripping its last message.
    pub fn redacted(device: &DeviceRecord, history: &[HistoryEntry]) -> Self {
        let mut device = device.clone();
        let last_message = std::mem::take(&mut device.metrics.last_message);
        Self {
            device,
            redacted_attributes: last_message.into_iter().map(|(key, _)| key).collect(),
            history: HistorySummary::of(history),
        }
    }
}
