//! In-memory device state store.
//!
//! The store is the single owner of device records, their bounded history
//! and the last bridge state. Every write recomputes the device's analytics
//! and caches them on the record; readers get owned copies.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;
use tracing::{debug, info};

use zigsight_types::{
    AnalyticsResult, BRIDGE_DEVICE_ID, BridgeState, DeviceDiagnostics, DeviceRecord, ExportRecord,
    HistoryEntry, MetricsSnapshot, NodeType, TopologyGraph, TrendMetric, TrendPoint,
};

use crate::analytics::{AnalyticsConfig, DeviceAnalytics, RECONNECT_GAP_SECS, window_start};
use crate::events::{DeviceEvent, EventDispatcher, EventReceiver};
use crate::export::ExportFilter;
use crate::payload::{declared_friendly_name, normalize_metrics};
use crate::topology::build_topology;
use crate::traits::TelemetryUpdate;

/// Maximum history entries kept per device.
pub const MAX_HISTORY: usize = 1000;

/// Diagnostics dump of the whole store.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub device_count: usize,
    pub analytics_config: AnalyticsConfig,
    pub bridge: Option<BridgeState>,
    pub devices: IndexMap<String, DeviceDiagnostics>,
}

/// Device counts per mesh role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeviceTypeCounts {
    pub coordinator: usize,
    pub router: usize,
    pub end_device: usize,
}

/// Network-wide summary of the tracked devices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkOverview {
    pub total_devices: usize,
    pub average_health_score: f64,
    pub devices_with_warnings: usize,
    pub battery_distribution: IndexMap<&'static str, usize>,
    pub link_quality_distribution: IndexMap<&'static str, usize>,
    pub devices_by_type: DeviceTypeCounts,
}

const BATTERY_BUCKETS: [(&str, f64); 5] = [
    ("0-20", 20.0),
    ("21-40", 40.0),
    ("41-60", 60.0),
    ("61-80", 80.0),
    ("81-100", 100.0),
];

const LINK_QUALITY_BUCKETS: [(&str, f64); 4] = [
    ("poor (0-99)", 100.0),
    ("fair (100-149)", 150.0),
    ("good (150-199)", 200.0),
    ("excellent (200-255)", 256.0),
];

/// In-memory store for Zigbee device state.
#[derive(Debug)]
pub struct DeviceStore {
    devices: IndexMap<String, DeviceRecord>,
    history: HashMap<String, Vec<HistoryEntry>>,
    bridge: Option<BridgeState>,
    analytics: DeviceAnalytics,
    events: EventDispatcher,
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new(DeviceAnalytics::default())
    }
}

impl DeviceStore {
    /// Create an empty store using the given analytics engine.
    pub fn new(analytics: DeviceAnalytics) -> Self {
        Self::with_events(analytics, EventDispatcher::default())
    }

    /// Create an empty store publishing on `events`.
    pub fn with_events(analytics: DeviceAnalytics, events: EventDispatcher) -> Self {
        Self {
            devices: IndexMap::new(),
            history: HashMap::new(),
            bridge: None,
            analytics,
            events,
        }
    }

    /// The analytics engine used by the store.
    pub fn analytics(&self) -> &DeviceAnalytics {
        &self.analytics
    }

    /// Replace the analytics engine. Cached results refresh on the next write.
    pub fn set_analytics(&mut self, analytics: DeviceAnalytics) {
        self.analytics = analytics;
    }

    /// Subscribe to store events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// The store's event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    // === Writes ===

    /// Apply an update from any telemetry source, stamped with the current time.
    pub fn apply(&mut self, update: TelemetryUpdate) {
        self.apply_at(update, OffsetDateTime::now_utc());
    }

    /// Apply an update received at `now`.
    pub fn apply_at(&mut self, update: TelemetryUpdate, now: OffsetDateTime) {
        match update {
            TelemetryUpdate::Device { device_id, payload } => {
                self.process_device_update_at(&device_id, &payload, now);
            }
            TelemetryUpdate::Bridge { state } => self.process_bridge_state_at(state, now),
        }
    }

    /// Process a device message received now.
    pub fn process_device_update(&mut self, device_id: &str, payload: &Map<String, Value>) {
        self.process_device_update_at(device_id, payload, OffsetDateTime::now_utc());
    }

    /// Process a device message received at `now`.
    ///
    /// Messages addressed to `"bridge"` are routed to the bridge slot.
    pub fn process_device_update_at(
        &mut self,
        device_id: &str,
        payload: &Map<String, Value>,
        now: OffsetDateTime,
    ) {
        if device_id == BRIDGE_DEVICE_ID {
            self.process_bridge_state_at(Value::Object(payload.clone()), now);
            return;
        }

        let metrics = normalize_metrics(payload, now);

        let device = self
            .devices
            .entry(device_id.to_string())
            .or_insert_with(|| {
                info!("Tracking new device {}", device_id);
                DeviceRecord::new(device_id, now)
            });

        let reconnected = device
            .metrics
            .last_seen
            .is_some_and(|previous| (now - previous).as_seconds_f64() > RECONNECT_GAP_SECS);
        if reconnected {
            device.reconnect_count += 1;
            device.last_reconnect = Some(now);
            debug!(
                "Device {} reconnected ({} total)",
                device_id, device.reconnect_count
            );
        }

        device.metrics = metrics.clone();
        device.last_update = now;
        if let Some(name) = declared_friendly_name(payload) {
            device.friendly_name = name.to_string();
        }

        let history = self.history.entry(device_id.to_string()).or_default();
        history.push(HistoryEntry::new(now, metrics.clone()));
        if history.len() > MAX_HISTORY {
            let excess = history.len() - MAX_HISTORY;
            history.drain(..excess);
        }

        let analytics = self.analytics.analyze(device, history, now);
        device.analytics = Some(analytics);
        let reconnect_count = device.reconnect_count;

        debug!(
            "Updated device {}: lq={:?} battery={:?}",
            device_id, metrics.link_quality, metrics.battery
        );

        self.events.send(DeviceEvent::Updated {
            device_id: device_id.to_string(),
            metrics,
        });
        if reconnected {
            self.events.send(DeviceEvent::Reconnected {
                device_id: device_id.to_string(),
                reconnect_count,
                at: now,
            });
        }
    }

    /// Record a bridge state received now.
    pub fn process_bridge_state(&mut self, state: Value) {
        self.process_bridge_state_at(state, OffsetDateTime::now_utc());
    }

    /// Record a bridge state received at `now`.
    pub fn process_bridge_state_at(&mut self, state: Value, now: OffsetDateTime) {
        let bridge = BridgeState {
            state: state.clone(),
            last_update: now,
        };
        if let Some(s) = bridge.state_str() {
            info!("Bridge state: {}", s);
        }
        self.bridge = Some(bridge);
        self.events.send(DeviceEvent::BridgeState { state });
    }

    // === Reads ===

    /// Get a device record.
    pub fn get_device(&self, device_id: &str) -> Option<DeviceRecord> {
        self.devices.get(device_id).cloned()
    }

    /// Get a device's current metrics.
    pub fn get_device_metrics(&self, device_id: &str) -> Option<MetricsSnapshot> {
        self.devices.get(device_id).map(|d| d.metrics.clone())
    }

    /// Get a device's history, oldest first. Empty for unknown devices.
    pub fn get_device_history(&self, device_id: &str) -> Vec<HistoryEntry> {
        self.history.get(device_id).cloned().unwrap_or_default()
    }

    fn history_slice(&self, device_id: &str) -> &[HistoryEntry] {
        self.history.get(device_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All device records, in first-seen order.
    pub fn get_all_devices(&self) -> IndexMap<String, DeviceRecord> {
        self.devices.clone()
    }

    /// Borrow the device map.
    pub fn devices(&self) -> &IndexMap<String, DeviceRecord> {
        &self.devices
    }

    /// Number of tracked devices.
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// The last bridge state, if one was received.
    pub fn bridge_state(&self) -> Option<&BridgeState> {
        self.bridge.as_ref()
    }

    /// Build the current topology graph.
    pub fn topology(&self) -> TopologyGraph {
        build_topology(&self.devices)
    }

    // === Lazy analytics ===

    /// Reconnect rate at the current time.
    pub fn get_device_reconnect_rate(&self, device_id: &str) -> Option<f64> {
        self.get_device_reconnect_rate_at(device_id, OffsetDateTime::now_utc())
    }

    /// Reconnect rate at `now`.
    pub fn get_device_reconnect_rate_at(&self, device_id: &str, now: OffsetDateTime) -> Option<f64> {
        self.devices.get(device_id)?;
        Some(
            self.analytics
                .reconnect_rate(self.history_slice(device_id), now),
        )
    }

    /// Battery trend at the current time.
    pub fn get_device_battery_trend(&self, device_id: &str) -> Option<f64> {
        self.get_device_battery_trend_at(device_id, OffsetDateTime::now_utc())
    }

    /// Battery trend at `now`.
    pub fn get_device_battery_trend_at(&self, device_id: &str, now: OffsetDateTime) -> Option<f64> {
        self.devices.get(device_id)?;
        self.analytics
            .battery_trend(self.history_slice(device_id), now)
    }

    /// Health score at the current time.
    pub fn get_device_health_score(&self, device_id: &str) -> Option<f64> {
        self.get_device_health_score_at(device_id, OffsetDateTime::now_utc())
    }

    /// Health score at `now`.
    pub fn get_device_health_score_at(&self, device_id: &str, now: OffsetDateTime) -> Option<f64> {
        let device = self.devices.get(device_id)?;
        Some(
            self.analytics
                .compute_health_score(device, self.history_slice(device_id), now),
        )
    }

    /// Battery drain warning at the current time. False for unknown devices.
    pub fn get_device_battery_drain_warning(&self, device_id: &str) -> bool {
        self.get_device_battery_drain_warning_at(device_id, OffsetDateTime::now_utc())
    }

    /// Battery drain warning at `now`.
    pub fn get_device_battery_drain_warning_at(&self, device_id: &str, now: OffsetDateTime) -> bool {
        if !self.devices.contains_key(device_id) {
            return false;
        }
        self.analytics.check_battery_drain_warning(
            self.history_slice(device_id),
            self.analytics.config().battery_drain_threshold,
            now,
        )
    }

    /// Connectivity warning at the current time. False for unknown devices.
    pub fn get_device_connectivity_warning(&self, device_id: &str) -> bool {
        self.get_device_connectivity_warning_at(device_id, OffsetDateTime::now_utc())
    }

    /// Connectivity warning at `now`.
    pub fn get_device_connectivity_warning_at(&self, device_id: &str, now: OffsetDateTime) -> bool {
        let Some(device) = self.devices.get(device_id) else {
            return false;
        };
        self.analytics.check_connectivity_warning(
            device,
            self.history_slice(device_id),
            self.analytics.config().reconnect_rate_threshold,
            now,
        )
    }

    /// All analytics at the current time.
    pub fn get_device_analytics(&self, device_id: &str) -> Option<AnalyticsResult> {
        self.get_device_analytics_at(device_id, OffsetDateTime::now_utc())
    }

    /// All analytics at `now`.
    pub fn get_device_analytics_at(
        &self,
        device_id: &str,
        now: OffsetDateTime,
    ) -> Option<AnalyticsResult> {
        let device = self.devices.get(device_id)?;
        Some(
            self.analytics
                .analyze(device, self.history_slice(device_id), now),
        )
    }

    // === Reports ===

    /// Time series of `metric` for a device over the last `hours`.
    ///
    /// Battery and link quality come from each history entry. Health score
    /// and reconnect rate are not stored per entry; the cached value is
    /// reported at the device's last update when that falls in the window.
    pub fn metric_trend(
        &self,
        device_id: &str,
        metric: TrendMetric,
        hours: f64,
        now: OffsetDateTime,
    ) -> Vec<TrendPoint> {
        let start = window_start(now, hours.max(0.0));
        let in_window = |ts: OffsetDateTime| start.is_none_or(|start| ts >= start);

        match metric {
            TrendMetric::Battery | TrendMetric::LinkQuality => self
                .history_slice(device_id)
                .iter()
                .filter(|entry| in_window(entry.timestamp))
                .filter_map(|entry| {
                    let value = match metric {
                        TrendMetric::Battery => entry.metrics.battery,
                        _ => entry.metrics.link_quality,
                    }?;
                    Some(TrendPoint {
                        timestamp: entry.timestamp,
                        value,
                    })
                })
                .collect(),
            TrendMetric::HealthScore | TrendMetric::ReconnectRate => {
                let Some(device) = self.devices.get(device_id) else {
                    return Vec::new();
                };
                let Some(analytics) = &device.analytics else {
                    return Vec::new();
                };
                if !in_window(device.last_update) {
                    return Vec::new();
                }
                let value = match metric {
                    TrendMetric::HealthScore => analytics.health_score,
                    _ => analytics.reconnect_rate,
                };
                vec![TrendPoint {
                    timestamp: device.last_update,
                    value,
                }]
            }
        }
    }

    /// Diagnostics for every device, with raw messages redacted.
    pub fn diagnostics(&self) -> DiagnosticsReport {
        let devices = self
            .devices
            .iter()
            .map(|(id, device)| {
                (
                    id.clone(),
                    DeviceDiagnostics::redacted(device, self.history_slice(id)),
                )
            })
            .collect();

        DiagnosticsReport {
            device_count: self.devices.len(),
            analytics_config: self.analytics.config().clone(),
            bridge: self.bridge.clone(),
            devices,
        }
    }

    /// Summary of every device except the bridge, from cached analytics.
    pub fn overview(&self) -> NetworkOverview {
        let devices: Vec<&DeviceRecord> = self
            .devices
            .iter()
            .filter(|(id, _)| id.as_str() != BRIDGE_DEVICE_ID)
            .map(|(_, device)| device)
            .collect();

        let scores: Vec<f64> = devices
            .iter()
            .filter_map(|d| d.analytics.as_ref().map(|a| a.health_score))
            .collect();
        let average_health_score = if scores.is_empty() {
            0.0
        } else {
            let mean = scores.iter().sum::<f64>() / scores.len() as f64;
            (mean * 10.0).round() / 10.0
        };

        let devices_with_warnings = devices
            .iter()
            .filter(|d| {
                d.analytics
                    .as_ref()
                    .is_some_and(|a| a.battery_drain_warning || a.connectivity_warning)
            })
            .count();

        // Battery buckets include their upper bound.
        let mut battery_distribution: IndexMap<&'static str, usize> =
            BATTERY_BUCKETS.iter().map(|(label, _)| (*label, 0)).collect();
        for battery in devices.iter().filter_map(|d| d.metrics.battery) {
            if let Some((label, _)) = BATTERY_BUCKETS.iter().find(|(_, upper)| battery <= *upper) {
                *battery_distribution.entry(label).or_default() += 1;
            }
        }

        let mut link_quality_distribution: IndexMap<&'static str, usize> = LINK_QUALITY_BUCKETS
            .iter()
            .map(|(label, _)| (*label, 0))
            .collect();
        for lq in devices.iter().filter_map(|d| d.metrics.link_quality) {
            if let Some((label, _)) = LINK_QUALITY_BUCKETS
                .iter()
                .find(|(_, upper)| lq >= 0.0 && lq < *upper)
            {
                *link_quality_distribution.entry(label).or_default() += 1;
            }
        }

        let mut devices_by_type = DeviceTypeCounts::default();
        for device in &devices {
            match device.metrics.declared_node_type() {
                NodeType::Coordinator => devices_by_type.coordinator += 1,
                NodeType::Router => devices_by_type.router += 1,
                NodeType::EndDevice => devices_by_type.end_device += 1,
            }
        }

        NetworkOverview {
            total_devices: devices.len(),
            average_health_score,
            devices_with_warnings,
            battery_distribution,
            link_quality_distribution,
            devices_by_type,
        }
    }

    /// Export rows for the devices matching `filter`.
    pub fn export(&self, filter: &ExportFilter) -> Vec<ExportRecord> {
        crate::export::export_records(&self.devices, filter)
    }
}
