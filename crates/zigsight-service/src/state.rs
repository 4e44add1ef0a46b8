//! Application state shared across handlers.
//!
//! # Event Channel Behavior
//!
//! The store publishes a [`DeviceEvent`](zigsight_core::DeviceEvent) for every
//! processed message on a broadcast channel sized by `server.broadcast_buffer`
//! (default: 100). Slow subscribers lose the oldest events; the collector never
//! blocks on them.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//! broadcast_buffer = 200  # Larger buffer for slow clients
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use zigsight_core::{ChannelAdvisor, DeviceAnalytics, DeviceStore, EventDispatcher};

use crate::config::Config;

/// Shared application state.
pub struct AppState {
    /// Device records, history and bridge state. Written only by the collector.
    pub store: RwLock<DeviceStore>,
    /// Issued channel recommendations.
    pub advisor: Mutex<ChannelAdvisor>,
    /// Configuration.
    pub config: RwLock<Config>,
    /// The store's event dispatcher, for subscribing without taking the store lock.
    pub events: EventDispatcher,
    /// Collector status.
    pub collector: CollectorState,
    /// Cancelled when the service shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: Config) -> Arc<Self> {
        let events = EventDispatcher::new(config.server.broadcast_buffer);
        let analytics = DeviceAnalytics::new(config.analytics.clone());
        let store = DeviceStore::with_events(analytics, events.clone());
        let advisor = ChannelAdvisor::new(config.advisor.history_size);

        Arc::new(Self {
            store: RwLock::new(store),
            advisor: Mutex::new(advisor),
            config: RwLock::new(config),
            events,
            collector: CollectorState::new(),
            shutdown: CancellationToken::new(),
        })
    }
}

/// State for tracking the collector.
#[derive(Debug, Default)]
pub struct CollectorState {
    /// Whether the collector is currently running.
    running: AtomicBool,
    /// When the collector was started (Unix timestamp).
    started_at: AtomicU64,
    /// Updates applied to the store.
    updates: AtomicU64,
    /// Errors returned by the telemetry source.
    errors: AtomicU64,
}

impl CollectorState {
    /// Create a new collector state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the collector is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Mark the collector as started or stopped.
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
        if running {
            let now = OffsetDateTime::now_utc().unix_timestamp() as u64;
            self.started_at.store(now, Ordering::SeqCst);
        }
    }

    /// Get the collector start time.
    pub fn started_at(&self) -> Option<OffsetDateTime> {
        let ts = self.started_at.load(Ordering::SeqCst);
        if ts == 0 {
            None
        } else {
            OffsetDateTime::from_unix_timestamp(ts as i64).ok()
        }
    }

    pub fn record_update(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of updates applied since startup.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }

    /// Number of source errors since startup.
    pub fn error_count(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zigsight_core::DeviceEvent;

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(Config::default());

        let config = state.config.read().await;
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        assert_eq!(state.store.read().await.device_count(), 0);
        assert_eq!(state.advisor.lock().await.capacity(), 10);
        assert!(!state.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn test_app_state_uses_configured_analytics() {
        let mut config = Config::default();
        config.analytics.reconnect_rate_threshold = 1.5;
        config.advisor.history_size = 4;
        let state = AppState::new(config);

        let store = state.store.read().await;
        assert_eq!(store.analytics().config().reconnect_rate_threshold, 1.5);
        assert_eq!(state.advisor.lock().await.capacity(), 4);
    }

    #[tokio::test]
    async fn test_events_reach_state_subscribers() {
        let state = AppState::new(Config::default());
        let mut rx = state.events.subscribe();

        let payload = json!({"linkquality": 90});
        state
            .store
            .write()
            .await
            .process_device_update("0x01", payload.as_object().unwrap());

        match rx.recv().await.unwrap() {
            DeviceEvent::Updated { device_id, metrics } => {
                assert_eq!(device_id, "0x01");
                assert_eq!(metrics.link_quality, Some(90.0));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_collector_state() {
        let collector = CollectorState::new();
        assert!(!collector.is_running());
        assert!(collector.started_at().is_none());

        collector.set_running(true);
        assert!(collector.is_running());
        assert!(collector.started_at().is_some());

        collector.set_running(false);
        assert!(!collector.is_running());
    }

    #[test]
    fn test_collector_counters() {
        let collector = CollectorState::new();
        collector.record_update();
        collector.record_update();
        collector.record_error();
        assert_eq!(collector.update_count(), 2);
        assert_eq!(collector.error_count(), 1);
    }
}
