//! Background telemetry collector.
//!
//! The collector is the only writer of the device store. It pulls updates
//! from a [`TelemetrySource`] one at a time and applies each under the store
//! write lock, until the source ends or the service shuts down.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use zigsight_core::TelemetrySource;

use crate::config::{Config, SourceKind};
use crate::state::AppState;

/// Pause after a source error before asking for the next update.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Background collector that feeds telemetry into the store.
pub struct Collector {
    state: Arc<AppState>,
}

impl Collector {
    /// Create a new collector.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Build the configured source and start collecting in the background.
    pub async fn start(&self) -> Result<JoinHandle<()>, CollectorError> {
        let source = {
            let config = self.state.config.read().await;
            build_source(&config)?
        };
        Ok(self.start_with(source))
    }

    /// Start collecting from `source` in the background.
    ///
    /// Returns immediately; the task runs until the source ends or
    /// `state.shutdown` is cancelled.
    pub fn start_with(&self, source: Box<dyn TelemetrySource>) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            run(state, source).await;
        })
    }
}

/// Build the telemetry source selected in `config`.
pub fn build_source(config: &Config) -> Result<Box<dyn TelemetrySource>, CollectorError> {
    match config.source.kind {
        #[cfg(feature = "mqtt")]
        SourceKind::Zigbee2mqtt => Ok(Box::new(crate::mqtt::Zigbee2MqttSource::new(
            &config.mqtt,
        )?)),
        #[cfg(not(feature = "mqtt"))]
        SourceKind::Zigbee2mqtt => Err(CollectorError::Unsupported(
            "zigbee2mqtt source requires the `mqtt` feature".to_string(),
        )),
        SourceKind::Registry => Ok(Box::new(crate::registry::RegistrySource::new(
            &config.registry,
        )?)),
    }
}

/// Drive `source` until it ends or shutdown is requested, then close it.
async fn run(state: Arc<AppState>, mut source: Box<dyn TelemetrySource>) {
    let name = source.name().to_string();
    info!("Starting collector for source '{}'", name);
    state.collector.set_running(true);

    let mut consecutive_failures = 0u32;

    loop {
        let next = tokio::select! {
            _ = state.shutdown.cancelled() => {
                info!("Collector received stop signal");
                break;
            }
            next = source.next_update() => next,
        };

        match next {
            Ok(Some(update)) => {
                consecutive_failures = 0;
                state.store.write().await.apply(update);
                state.collector.record_update();
            }
            Ok(None) => {
                info!("Source '{}' ended", name);
                break;
            }
            Err(e) => {
                consecutive_failures += 1;
                state.collector.record_error();
                if consecutive_failures <= 3 {
                    warn!(
                        "Source '{}' failed: {} (attempt {})",
                        name, e, consecutive_failures
                    );
                } else if consecutive_failures == 4 {
                    error!(
                        "Source '{}' failed {} times, will continue trying silently",
                        name, consecutive_failures
                    );
                }
                if source_is_fatal(&e) {
                    error!("Source '{}' cannot recover, stopping collector", name);
                    break;
                }
                tokio::select! {
                    _ = state.shutdown.cancelled() => {
                        info!("Collector received stop signal");
                        break;
                    }
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }
    }

    if let Err(e) = source.close().await {
        debug!("Error closing source '{}': {}", name, e);
    }
    state.collector.set_running(false);
    info!("Collector for source '{}' stopped", name);
}

fn source_is_fatal(error: &zigsight_core::Error) -> bool {
    error.is_config_error()
}

/// Collector errors.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Failed to create telemetry source: {0}")]
    Source(#[from] zigsight_core::Error),
    #[error("Unsupported telemetry source: {0}")]
    Unsupported(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use zigsight_core::{Error, ReplaySource};

    fn state() -> Arc<AppState> {
        AppState::new(Config::default())
    }

    #[tokio::test]
    async fn test_collector_drains_source() {
        let state = state();
        let source = ReplaySource::new("replay")
            .bridge(json!("online"))
            .device("0x01", json!({"linkquality": 120, "battery": 90}))
            .device("0x02", json!({"linkquality": 60}));
        let closed = source.closed_flag();

        let handle = Collector::new(Arc::clone(&state)).start_with(Box::new(source));
        handle.await.unwrap();

        let store = state.store.read().await;
        assert_eq!(store.device_count(), 2);
        assert_eq!(
            store.bridge_state().and_then(|b| b.state_str()),
            Some("online")
        );
        assert_eq!(state.collector.update_count(), 3);
        assert!(!state.collector.is_running());
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collector_keeps_going_after_source_error() {
        let state = state();
        let source = ReplaySource::new("flaky")
            .device("0x01", json!({"linkquality": 120}))
            .device("0x02", json!({"linkquality": 80}))
            .fail_after(1, "broker hiccup");

        let handle = Collector::new(Arc::clone(&state)).start_with(Box::new(source));
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(state.collector.is_running());
        assert!(state.collector.error_count() >= 3);
        assert_eq!(state.store.read().await.device_count(), 1);

        state.shutdown.cancel();
        handle.await.unwrap();
        assert!(!state.collector.is_running());
    }

    #[tokio::test]
    async fn test_collector_stops_on_shutdown() {
        let state = state();
        let source = ReplaySource::new("slow")
            .device("0x01", json!({"linkquality": 120}))
            .with_latency(Duration::from_secs(3600));
        let closed = source.closed_flag();

        let handle = Collector::new(Arc::clone(&state)).start_with(Box::new(source));
        while !state.collector.is_running() {
            tokio::task::yield_now().await;
        }

        state.shutdown.cancel();
        handle.await.unwrap();

        assert!(!state.collector.is_running());
        assert_eq!(state.store.read().await.device_count(), 0);
        assert!(closed.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_build_registry_source() {
        let mut config = Config::default();
        config.source.kind = SourceKind::Registry;
        let source = build_source(&config).unwrap();
        assert_eq!(source.name(), "registry");
    }

    #[test]
    fn test_fatal_errors() {
        assert!(source_is_fatal(&Error::invalid_config("bad")));
        assert!(!source_is_fatal(&Error::source_failed("x", "transient")));
    }
}
