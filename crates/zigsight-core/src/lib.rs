//! Analytics core for Zigbee mesh networks.
//!
//! This crate turns raw Zigbee telemetry into device reliability analytics,
//! a mesh topology graph and Wi-Fi aware channel recommendations. It owns no
//! transport: telemetry arrives through the [`TelemetrySource`] trait and is
//! applied to a [`DeviceStore`].
//!
//! # Features
//!
//! - **Device state**: per-device records with bounded history
//! - **Analytics**: reconnect rate, battery trend, health score, warnings
//! - **Topology**: node/edge graph with a synthesized coordinator
//! - **Channel scoring**: Wi-Fi/Zigbee frequency overlap per candidate channel
//! - **Wi-Fi scanning**: manual data, router APIs and host tools
//! - **Export**: JSON and CSV device summaries
//! - **Events**: broadcast notifications for every processed message
//!
//! # Zigbee Channel Candidates
//!
//! | Channel | Center frequency | Notes |
//! |---------|------------------|-------|
//! | 11 | 2405 MHz | Overlaps Wi-Fi 1 |
//! | 15 | 2425 MHz | Between Wi-Fi 1 and 6 |
//! | 20 | 2450 MHz | Between Wi-Fi 6 and 11 |
//! | 25 | 2475 MHz | Above Wi-Fi 11, default |
//!
//! # Quick Start
//!
//! ```
//! use serde_json::json;
//! use zigsight_core::{DeviceStore, WifiAccessPoint, frequency};
//!
//! let mut store = DeviceStore::default();
//! let payload = json!({"linkquality": 140, "battery": 92, "type": "EndDevice"});
//! store.process_device_update("0x00158d0001a2b3c4", payload.as_object().unwrap());
//!
//! let graph = store.topology();
//! assert_eq!(graph.end_device_count, 1);
//!
//! let rec = frequency::recommend(&[WifiAccessPoint::new(11, -45.0)]);
//! assert_eq!(rec.recommended_channel, 11);
//! ```

pub mod advisor;
pub mod analytics;
pub mod error;
pub mod events;
pub mod export;
pub mod frequency;
pub mod mock;
pub mod payload;
pub mod scanner;
pub mod store;
pub mod topology;
pub mod traits;

// Core exports
pub use advisor::{ChannelAdvisor, IssuedRecommendation};
pub use analytics::{AnalyticsConfig, DeviceAnalytics, HealthWeights};
pub use error::{Error, Result};
pub use events::{DeviceEvent, EventDispatcher, EventReceiver, EventSender};
pub use export::{ExportFilter, ExportFormat};
pub use mock::ReplaySource;
pub use scanner::{ScanData, ScannerSettings, WifiScanner, create_scanner};
pub use store::{DeviceStore, DeviceTypeCounts, DiagnosticsReport, MAX_HISTORY, NetworkOverview};
pub use topology::build_topology;
pub use traits::{TelemetrySource, TelemetryUpdate};

// Re-export from zigsight-types
pub use zigsight_types::{
    AnalyticsResult, BridgeState, ChannelRecommendation, DeviceDiagnostics, DeviceRecord,
    ExportRecord, HistoryEntry, HistorySummary, MetricsSnapshot, NodeType, NodeView,
    TopologyEdge, TopologyGraph, TrendMetric, TrendPoint, WifiAccessPoint,
};
