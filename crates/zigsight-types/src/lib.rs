//! Shared data model for Zigbee mesh analytics.
//!
//! This crate holds the plain data exchanged between the analytics core
//! (zigsight-core) and the service that drives it (zigsight-service).
//!
//! # Features
//!
//! - Device records, metrics snapshots and history entries
//! - Derived analytics results
//! - Topology graph nodes and edges
//! - Wi-Fi access points and channel recommendations
//! - Export rows and trend samples
//!
//! # Example
//!
//! ```
//! use zigsight_types::{NodeType, WifiAccessPoint};
//!
//! let ap = WifiAccessPoint::new(6, -45.0).with_ssid("home");
//! assert_eq!(ap.channel, 6);
//! assert_eq!(NodeType::from_declared(Some("Router")), NodeType::Router);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    AnalyticsResult, BRIDGE_DEVICE_ID, BridgeState, ChannelRecommendation, DeviceDiagnostics,
    DeviceRecord, ExportRecord, HistoryEntry, HistorySummary, MetricsSnapshot, NodeAnalytics, NodeType, NodeView,
    SYNTHETIC_COORDINATOR_ID, TopologyEdge, TopologyGraph, TrendMetric, TrendPoint,
    WifiAccessPoint, parse_timestamp,
};

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    fn snapshot_with(message: serde_json::Value) -> MetricsSnapshot {
        MetricsSnapshot {
            last_message: message.as_object().cloned().unwrap_or_default(),
            ..Default::default()
        }
    }

    // --- MetricsSnapshot tests ---

    #[test]
    fn test_declared_node_type() {
        assert_eq!(
            snapshot_with(json!({"type": "Router"})).declared_node_type(),
            NodeType::Router
        );
        assert_eq!(
            snapshot_with(json!({"type": "Coordinator"})).declared_node_type(),
            NodeType::Coordinator
        );
        assert_eq!(
            snapshot_with(json!({"type": "router"})).declared_node_type(),
            NodeType::EndDevice
        );
        assert_eq!(
            snapshot_with(json!({"type": 3})).declared_node_type(),
            NodeType::EndDevice
        );
        assert_eq!(
            MetricsSnapshot::default().declared_node_type(),
            NodeType::EndDevice
        );
    }

    #[test]
    fn test_parent_ieee() {
        let snapshot = snapshot_with(json!({"parent_ieee": "0x00124b0001"}));
        assert_eq!(snapshot.parent_ieee(), Some("0x00124b0001"));

        assert_eq!(snapshot_with(json!({"parent_ieee": ""})).parent_ieee(), None);
        assert_eq!(snapshot_with(json!({"parent_ieee": null})).parent_ieee(), None);
        assert_eq!(MetricsSnapshot::default().parent_ieee(), None);
    }

    #[test]
    fn test_metrics_snapshot_serde() {
        let snapshot = MetricsSnapshot {
            link_quality: Some(120.0),
            battery: None,
            voltage: Some(3000.0),
            last_seen: Some(datetime!(2024-05-01 12:00 UTC)),
            last_message: json!({"linkquality": 120}).as_object().cloned().unwrap(),
        };

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["link_quality"], 120.0);
        assert!(value["battery"].is_null());
        assert_eq!(value["last_seen"], "2024-05-01T12:00:00Z");
        assert_eq!(value["last_message"]["linkquality"], 120);

        let parsed: MetricsSnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, snapshot);
    }

    // --- DeviceRecord tests ---

    #[test]
    fn test_device_record_new() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let record = DeviceRecord::new("kitchen_sensor", now);

        assert_eq!(record.device_id, "kitchen_sensor");
        assert_eq!(record.friendly_name, "kitchen_sensor");
        assert_eq!(record.first_seen, now);
        assert_eq!(record.last_update, now);
        assert_eq!(record.reconnect_count, 0);
        assert!(record.last_reconnect.is_none());
        assert!(record.analytics.is_none());
    }

    // --- BridgeState tests ---

    #[test]
    fn test_bridge_state_str() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let plain = BridgeState {
            state: json!("online"),
            last_update: now,
        };
        assert_eq!(plain.state_str(), Some("online"));

        let object = BridgeState {
            state: json!({"state": "offline"}),
            last_update: now,
        };
        assert_eq!(object.state_str(), Some("offline"));

        let other = BridgeState {
            state: json!(42),
            last_update: now,
        };
        assert_eq!(other.state_str(), None);
    }

    // --- NodeType tests ---

    #[test]
    fn test_node_type_serialization() {
        assert_eq!(
            serde_json::to_string(&NodeType::EndDevice).unwrap(),
            "\"end_device\""
        );
        assert_eq!(
            serde_json::to_string(&NodeType::Coordinator).unwrap(),
            "\"coordinator\""
        );
        assert_eq!(NodeType::Router.to_string(), "router");
    }

    #[test]
    fn test_node_analytics_from_result() {
        let result = AnalyticsResult {
            reconnect_rate: 0.5,
            battery_trend: Some(-1.25),
            health_score: 80.0,
            battery_drain_warning: false,
            connectivity_warning: true,
        };
        let analytics = NodeAnalytics::from(&result);
        assert_eq!(analytics.reconnect_rate, Some(0.5));
        assert_eq!(analytics.battery_trend, Some(-1.25));
        assert_eq!(analytics.battery_drain_warning, Some(false));
        assert_eq!(analytics.connectivity_warning, Some(true));
    }

    #[test]
    fn test_empty_node_analytics_serializes_as_empty_object() {
        let value = serde_json::to_value(NodeAnalytics::default()).unwrap();
        assert_eq!(value, json!({}));
    }

    // --- TopologyGraph tests ---

    fn node(id: &str, node_type: NodeType) -> NodeView {
        NodeView {
            id: id.to_string(),
            label: id.to_string(),
            node_type,
            link_quality: None,
            battery: None,
            last_seen: None,
            health_score: None,
            analytics: NodeAnalytics::default(),
        }
    }

    #[test]
    fn test_dangling_edges() {
        let graph = TopologyGraph {
            nodes: vec![
                node("coordinator", NodeType::Coordinator),
                node("plug", NodeType::Router),
                node("sensor", NodeType::EndDevice),
            ],
            edges: vec![
                TopologyEdge {
                    from: "plug".to_string(),
                    to: "sensor".to_string(),
                    link_quality: Some(90.0),
                },
                TopologyEdge {
                    from: "0x00124b0001".to_string(),
                    to: "plug".to_string(),
                    link_quality: None,
                },
            ],
            device_count: 3,
            coordinator_count: 1,
            router_count: 1,
            end_device_count: 1,
        };

        let dangling: Vec<_> = graph.dangling_edges().collect();
        assert_eq!(dangling.len(), 1);
        assert_eq!(dangling[0].from, "0x00124b0001");
        assert!(graph.node("plug").is_some());
        assert!(graph.node("missing").is_none());
    }

    #[test]
    fn test_node_view_type_field_name() {
        let value = serde_json::to_value(node("plug", NodeType::Router)).unwrap();
        assert_eq!(value["type"], "router");
        assert!(value.get("node_type").is_none());
    }

    // --- WifiAccessPoint tests ---

    #[test]
    fn test_access_point_deserialize_without_rssi() {
        let ap: WifiAccessPoint = serde_json::from_str(r#"{"channel": 6}"#).unwrap();
        assert_eq!(ap.channel, 6);
        assert_eq!(ap.rssi, None);
        assert_eq!(ap.ssid, None);
    }

    #[test]
    fn test_access_point_without_channel() {
        let aps: Vec<WifiAccessPoint> = serde_json::from_str(
            r#"[{"channel": 6, "rssi": -40}, {"rssi": -50, "ssid": "hidden"}, {"channel": null}]"#,
        )
        .unwrap();
        assert_eq!(aps.len(), 3);
        assert_eq!(aps[0].channel, 6);
        assert_eq!(aps[1].channel, 0);
        assert_eq!(aps[1].ssid.as_deref(), Some("hidden"));
        assert_eq!(aps[2].channel, 0);
    }

    #[test]
    fn test_access_point_builder() {
        let ap = WifiAccessPoint::new(11, -60.0).with_ssid("guest");
        assert_eq!(ap.rssi, Some(-60.0));
        assert_eq!(ap.ssid.as_deref(), Some("guest"));
    }

    // --- ExportRecord tests ---

    #[test]
    fn test_export_record_from_device_without_analytics() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut device = DeviceRecord::new("sensor", now);
        device.reconnect_count = 2;
        device.metrics.battery = Some(75.0);

        let record = ExportRecord::from(&device);
        assert_eq!(record.device_id, "sensor");
        assert_eq!(record.battery, Some(75.0));
        assert_eq!(record.health_score, None);
        assert_eq!(record.battery_drain_warning, None);
        assert_eq!(record.reconnect_count, 2);
    }

    #[test]
    fn test_export_record_fields() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let record = ExportRecord::from(&DeviceRecord::new("sensor", now));
        let value = serde_json::to_value(&record).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        let mut expected: Vec<_> = ExportRecord::FIELDS.iter().map(|s| s.to_string()).collect();
        keys.sort();
        expected.sort();
        assert_eq!(keys, expected);
    }

    // --- TrendMetric tests ---

    #[test]
    fn test_trend_metric_round_trip_names() {
        for metric in TrendMetric::ALL {
            assert_eq!(metric.as_str().parse::<TrendMetric>().unwrap(), metric);
        }
    }

    #[test]
    fn test_trend_metric_unknown() {
        let err = "uptime".parse::<TrendMetric>().unwrap_err();
        assert_eq!(err, ParseError::UnknownMetric("uptime".to_string()));
        assert!(err.to_string().contains("uptime"));
    }

    // --- Timestamp parsing ---

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, datetime!(2024-05-01 10:00 UTC));

        let err = parse_timestamp("not a date").unwrap_err();
        assert!(matches!(err, ParseError::InvalidValue(_)));
    }

    // --- Diagnostics ---

    #[test]
    fn test_diagnostics_redacts_last_message() {
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut record = DeviceRecord::new("sensor", now);
        record.metrics = snapshot_with(json!({"battery": 50, "pin": "1234"}));

        let history = vec![
            HistoryEntry::new(datetime!(2024-05-01 11:00 UTC), MetricsSnapshot::default()),
            HistoryEntry::new(now, MetricsSnapshot::default()),
        ];
        let diagnostics = DeviceDiagnostics::redacted(&record, &history);

        assert!(diagnostics.device.metrics.last_message.is_empty());
        assert_eq!(diagnostics.redacted_attributes, vec!["battery", "pin"]);
        assert_eq!(diagnostics.history.entry_count, 2);
        assert_eq!(
            diagnostics.history.oldest_entry,
            Some(datetime!(2024-05-01 11:00 UTC))
        );
        assert_eq!(diagnostics.history.newest_entry, Some(now));

        let value = serde_json::to_value(&diagnostics).unwrap();
        assert_eq!(value["device_id"], "sensor");
        assert!(!value.to_string().contains("1234"));
    }

    #[test]
    fn test_history_summary_empty() {
        let summary = HistorySummary::of(&[]);
        assert_eq!(summary.entry_count, 0);
        assert!(summary.oldest_entry.is_none());
        assert!(summary.newest_entry.is_none());
    }
}
