//! REST API endpoints for zigsight-service.
//!
//! This module provides HTTP endpoints for device state, analytics, topology
//! and channel recommendations.
//!
//! # Concurrency and Lock Acquisition
//!
//! - **`state.store`** (RwLock): Read lock for every query. Only the collector
//!   takes the write lock, so handlers never block each other.
//! - **`state.advisor`** (Mutex): Held while a recommendation is computed and
//!   recorded. Wi-Fi scans run before the lock is taken.
//!
//! No handler holds more than one of these locks at a time.
//!
//! ## Error Handling
//!
//! All endpoints return structured JSON errors via [`AppError`]. Configuration
//! mistakes in requests (unknown metric, unknown export format, bad scanner
//! settings) return HTTP 400. Unknown devices return HTTP 404.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use zigsight_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;

use zigsight_core::analytics::MAX_WINDOW_HOURS;
use zigsight_core::export::{self, ExportFilter, ExportFormat};
use zigsight_core::scanner::{ScannerSettings, create_scanner};
use zigsight_core::{
    AnalyticsResult, BridgeState, ChannelRecommendation, DeviceRecord, DiagnosticsReport,
    HistoryEntry, IssuedRecommendation, MetricsSnapshot, NetworkOverview, TopologyGraph,
    TrendMetric, TrendPoint, WifiAccessPoint,
};

use crate::state::AppState;

/// File name offered for CSV exports.
pub const CSV_EXPORT_FILENAME: &str = "zigsight-analytics.csv";

/// Default trend window in hours.
pub const DEFAULT_TREND_HOURS: f64 = 24.0;

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        // Devices
        .route("/api/devices", get(list_devices))
        .route("/api/devices/{id}", get(get_device))
        .route("/api/devices/{id}/metrics", get(get_device_metrics))
        .route("/api/devices/{id}/history", get(get_device_history))
        .route("/api/devices/{id}/analytics", get(get_device_analytics))
        .route("/api/bridge", get(get_bridge))
        // Network views
        .route("/api/topology", get(get_topology))
        .route("/api/analytics/overview", get(get_overview))
        .route("/api/analytics/trends", get(get_trends))
        .route("/api/analytics/export", get(export_analytics))
        .route("/api/diagnostics", get(get_diagnostics))
        // Channel recommendation
        .route(
            "/api/recommendation",
            get(get_recommendations).post(create_recommendation),
        )
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub source: &'static str,
    pub collector: CollectorStatus,
    pub device_count: usize,
}

/// Collector status information.
#[derive(Debug, Serialize)]
pub struct CollectorStatus {
    /// Whether the collector is running.
    pub running: bool,
    /// When the collector was started (if ever).
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// How long the collector has been running (in seconds).
    pub uptime_seconds: Option<u64>,
    /// Updates applied to the store.
    pub updates: u64,
    /// Errors reported by the telemetry source.
    pub errors: u64,
}

/// Get service status including collector state.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let running = state.collector.is_running();
    let started_at = state.collector.started_at();
    let uptime_seconds = started_at.filter(|_| running).map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });

    let source = state.config.read().await.source.kind.as_str();
    let device_count = state.store.read().await.device_count();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        source,
        collector: CollectorStatus {
            running,
            started_at,
            uptime_seconds,
            updates: state.collector.update_count(),
            errors: state.collector.error_count(),
        },
        device_count,
    })
}

// ==========================================================================
// Device Endpoints
// ==========================================================================

/// List all tracked devices in first-seen order.
async fn list_devices(State(state): State<Arc<AppState>>) -> Json<Vec<DeviceRecord>> {
    let store = state.store.read().await;
    Json(store.devices().values().cloned().collect())
}

async fn get_device(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeviceRecord>, AppError> {
    let store = state.store.read().await;
    store
        .get_device(&id)
        .map(Json)
        .ok_or_else(|| device_not_found(&id))
}

async fn get_device_metrics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MetricsSnapshot>, AppError> {
    let store = state.store.read().await;
    store
        .get_device_metrics(&id)
        .map(Json)
        .ok_or_else(|| device_not_found(&id))
}

/// History of a device, oldest first. Unknown devices have an empty history.
async fn get_device_history(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<HistoryEntry>> {
    let store = state.store.read().await;
    Json(store.get_device_history(&id))
}

/// Analytics recomputed at request time.
async fn get_device_analytics(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalyticsResult>, AppError> {
    let store = state.store.read().await;
    store
        .get_device_analytics(&id)
        .map(Json)
        .ok_or_else(|| device_not_found(&id))
}

async fn get_bridge(State(state): State<Arc<AppState>>) -> Result<Json<BridgeState>, AppError> {
    let store = state.store.read().await;
    store
        .bridge_state()
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Bridge state not found".to_string()))
}

fn device_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("Device not found: {}", id))
}

// ==========================================================================
// Network Views
// ==========================================================================

async fn get_topology(State(state): State<Arc<AppState>>) -> Json<TopologyGraph> {
    Json(state.store.read().await.topology())
}

async fn get_overview(State(state): State<Arc<AppState>>) -> Json<NetworkOverview> {
    Json(state.store.read().await.overview())
}

async fn get_diagnostics(State(state): State<Arc<AppState>>) -> Json<DiagnosticsReport> {
    Json(state.store.read().await.diagnostics())
}

/// Query parameters for trends.
#[derive(Debug, Default, Deserialize)]
pub struct TrendsQuery {
    pub device_id: Option<String>,
    pub metric: Option<String>,
    pub hours: Option<f64>,
}

/// A metric series for one device.
#[derive(Debug, Serialize)]
pub struct TrendsResponse {
    pub device_id: String,
    pub metric: TrendMetric,
    pub hours: f64,
    pub data: Vec<TrendPoint>,
}

/// Time series of one metric for one device.
///
/// # Errors
///
/// Returns [`AppError::BadRequest`] if `device_id` is missing, the metric is
/// unknown, or `hours` is not in `(0, MAX_WINDOW_HOURS]`.
async fn get_trends(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TrendsQuery>,
) -> Result<Json<TrendsResponse>, AppError> {
    let device_id = query
        .device_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::BadRequest("device_id is required".to_string()))?;

    let metric = match query.metric.as_deref() {
        None | Some("") => TrendMetric::HealthScore,
        Some(name) => name
            .parse::<TrendMetric>()
            .map_err(|e| AppError::BadRequest(e.to_string()))?,
    };

    let hours = query.hours.unwrap_or(DEFAULT_TREND_HOURS);
    if !(hours > 0.0 && hours <= MAX_WINDOW_HOURS) {
        return Err(AppError::BadRequest(format!(
            "hours must be in (0, {}], got {}",
            MAX_WINDOW_HOURS, hours
        )));
    }

    let data = state.store.read().await.metric_trend(
        &device_id,
        metric,
        hours,
        OffsetDateTime::now_utc(),
    );

    Ok(Json(TrendsResponse {
        device_id,
        metric,
        hours,
        data,
    }))
}

/// Query parameters for export.
#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub format: Option<String>,
    /// Comma-separated device ids.
    pub devices: Option<String>,
}

/// Export device analytics as JSON rows or a CSV attachment.
async fn export_analytics(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ExportQuery>,
) -> Result<Response, AppError> {
    let format = match query.format.as_deref() {
        None | Some("") => ExportFormat::default(),
        Some(name) => name.parse::<ExportFormat>()?,
    };
    let filter = query
        .devices
        .as_deref()
        .map(ExportFilter::parse_list)
        .unwrap_or_default();

    let records = state.store.read().await.export(&filter);
    debug!("Exporting {} device(s) as {:?}", records.len(), format);

    match format {
        ExportFormat::Json => Ok(Json(records).into_response()),
        ExportFormat::Csv => {
            let body = export::to_csv(&records)?;
            Ok((
                [
                    (header::CONTENT_TYPE, format.content_type().to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename={}", CSV_EXPORT_FILENAME),
                    ),
                ],
                body,
            )
                .into_response())
        }
    }
}

// ==========================================================================
// Channel Recommendation
// ==========================================================================

/// Request body for a channel recommendation.
///
/// Either a list of access points or scanner settings must be given. When
/// both are present the access points win.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RecommendationRequest {
    pub access_points: Option<Vec<WifiAccessPoint>>,
    pub scanner: Option<ScannerSettings>,
}

/// Issue a recommendation and record it in the advisor history.
async fn create_recommendation(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RecommendationRequest>,
) -> Result<Json<ChannelRecommendation>, AppError> {
    let access_points = match (request.access_points, request.scanner) {
        (Some(aps), _) => aps,
        (None, Some(settings)) => {
            let scanner = create_scanner(&settings)?;
            debug!("Scanning Wi-Fi with {} scanner", scanner.mode());
            scanner.scan().await?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "access_points or scanner is required".to_string(),
            ));
        }
    };

    let recommendation = state
        .advisor
        .lock()
        .await
        .recommend(&access_points, OffsetDateTime::now_utc());

    Ok(Json(recommendation))
}

/// Recommendation history response.
#[derive(Debug, Serialize)]
pub struct RecommendationHistoryResponse {
    pub last: Option<IssuedRecommendation>,
    pub history: Vec<IssuedRecommendation>,
}

async fn get_recommendations(
    State(state): State<Arc<AppState>>,
) -> Json<RecommendationHistoryResponse> {
    let advisor = state.advisor.lock().await;
    Json(RecommendationHistoryResponse {
        last: advisor.last().cloned(),
        history: advisor.history().cloned().collect(),
    })
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl From<zigsight_core::Error> for AppError {
    fn from(e: zigsight_core::Error) -> Self {
        if e.is_config_error() {
            AppError::BadRequest(e.to_string())
        } else {
            AppError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message,
        });

        (status, Json(body)).into_response()
    }
}
