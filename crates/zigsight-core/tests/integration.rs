//! Integration tests for zigsight-core
//!
//! These tests drive the store through the public API only: replayed
//! telemetry in, topology, analytics, export and recommendations out.

use serde_json::json;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use zigsight_core::export::{self, ExportFilter};
use zigsight_core::scanner::{ScannerSettings, create_scanner};
use zigsight_core::{
    ChannelAdvisor, DeviceEvent, DeviceStore, MAX_HISTORY, NodeType, ReplaySource,
    TelemetrySource, WifiAccessPoint,
};

const START: OffsetDateTime = datetime!(2024-05-01 08:00 UTC);

/// Drain a replay source into the store, one minute apart.
async fn replay_into(store: &mut DeviceStore, mut source: ReplaySource) -> OffsetDateTime {
    let mut now = START;
    while let Some(update) = source.next_update().await.unwrap() {
        store.apply_at(update, now);
        now += Duration::minutes(1);
    }
    source.close().await.unwrap();
    now - Duration::minutes(1)
}

fn small_mesh() -> ReplaySource {
    ReplaySource::new("mesh")
        .bridge(json!({"state": "online"}))
        .device(
            "0x0001",
            json!({"friendly_name": "Living room plug", "type": "Router", "linkquality": 200}),
        )
        .device(
            "0x0002",
            json!({"friendly_name": "Hall sensor", "type": "EndDevice", "parent_ieee": "0x0001",
                   "linkquality": 96, "battery": 88}),
        )
        .device(
            "0x0003",
            json!({"type": "EndDevice", "parent_ieee": "0x0001", "link_quality": "74",
                   "battery_percent": 61}),
        )
        .message("0x0004", json!("not an object"))
}

#[tokio::test]
async fn test_replay_builds_topology() {
    let mut store = DeviceStore::default();
    replay_into(&mut store, small_mesh()).await;

    assert_eq!(store.device_count(), 3);
    assert_eq!(
        store.bridge_state().and_then(|b| b.state_str()),
        Some("online")
    );

    let graph = store.topology();
    assert_eq!(graph.nodes[0].id, "coordinator");
    assert_eq!(graph.nodes[0].node_type, NodeType::Coordinator);
    assert_eq!(graph.device_count, 4);
    assert_eq!(graph.router_count, 1);
    assert_eq!(graph.end_device_count, 2);
    assert_eq!(graph.edges.len(), 2);
    assert!(graph.edges.iter().all(|e| e.from == "0x0001"));
    assert_eq!(graph.dangling_edges().count(), 0);

    let sensor = graph.node("0x0002").unwrap();
    assert_eq!(sensor.label, "Hall sensor");
    assert!(sensor.health_score.is_some());

    let third = graph.node("0x0003").unwrap();
    assert_eq!(third.link_quality, Some(74.0));
    assert_eq!(third.battery, Some(61.0));
}

#[tokio::test]
async fn test_events_follow_replay() {
    let mut store = DeviceStore::default();
    let mut rx = store.subscribe();
    replay_into(&mut store, small_mesh()).await;

    let mut updated = Vec::new();
    let mut bridge_events = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            DeviceEvent::Updated { device_id, .. } => updated.push(device_id),
            DeviceEvent::BridgeState { .. } => bridge_events += 1,
            _ => {}
        }
    }
    assert_eq!(updated, vec!["0x0001", "0x0002", "0x0003"]);
    assert_eq!(bridge_events, 1);
}

#[test]
fn test_history_capped_after_many_updates() {
    let mut store = DeviceStore::default();
    let payload = json!({"linkquality": 120, "battery": 90});
    let payload = payload.as_object().unwrap();

    for i in 0..(MAX_HISTORY as i64 + 1) {
        store.process_device_update_at("0x00aa", payload, START + Duration::seconds(i * 10));
    }

    let history = store.get_device_history("0x00aa");
    assert_eq!(history.len(), MAX_HISTORY);
    assert_eq!(history[0].timestamp, START + Duration::seconds(10));

    // Ten second spacing never counts as a reconnect.
    assert_eq!(store.get_device("0x00aa").unwrap().reconnect_count, 0);
}

#[test]
fn test_flapping_device_gets_connectivity_warning() {
    let mut store = DeviceStore::default();
    let payload = json!({"linkquality": 40});
    let payload = payload.as_object().unwrap();

    // A message every ten minutes for two hours: every gap is a reconnect.
    let mut now = START;
    for _ in 0..13 {
        store.process_device_update_at("flappy", payload, now);
        now += Duration::minutes(10);
    }
    let now = now - Duration::minutes(10);

    let device = store.get_device("flappy").unwrap();
    assert_eq!(device.reconnect_count, 12);

    let analytics = store.get_device_analytics_at("flappy", now).unwrap();
    assert_eq!(analytics.reconnect_rate, 0.5);
    assert!(!analytics.connectivity_warning);

    // A tighter threshold turns the same history into a warning.
    let strict = zigsight_core::AnalyticsConfig {
        reconnect_rate_threshold: 0.5,
        ..Default::default()
    };
    store.set_analytics(zigsight_core::DeviceAnalytics::try_new(strict).unwrap());
    assert!(store.get_device_connectivity_warning_at("flappy", now));
}

#[tokio::test]
async fn test_export_csv_after_replay() {
    let mut store = DeviceStore::default();
    replay_into(&mut store, small_mesh()).await;

    let rows = store.export(&ExportFilter::parse_list("0x0002,0x0003"));
    let csv = export::to_csv(&rows).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("device_id,friendly_name,last_update,link_quality"));
    assert!(lines[1].starts_with("0x0002,Hall sensor,"));
    assert!(lines[2].starts_with("0x0003,0x0003,"));
}

#[tokio::test]
async fn test_manual_scan_to_recommendation() {
    let scanner = create_scanner(&ScannerSettings::manual(vec![
        WifiAccessPoint::new(1, -35.0).with_ssid("upstairs"),
        WifiAccessPoint::new(6, -50.0),
        WifiAccessPoint::new(11, -55.0),
    ]))
    .unwrap();
    let aps = scanner.scan().await.unwrap();

    let mut advisor = ChannelAdvisor::default();
    let rec = advisor.recommend(&aps, START);

    assert_eq!(rec.scores.len(), 4);
    let best = rec.scores[&rec.recommended_channel];
    assert!(rec.scores.values().all(|score| *score >= best));
    assert!(rec.explanation.contains(&format!("channel {}", rec.recommended_channel)));
    assert_eq!(advisor.last().unwrap().access_point_count, 3);
}
