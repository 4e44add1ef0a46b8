//! Replayed telemetry for testing.
//!
//! [`ReplaySource`] implements [`TelemetrySource`] over a prepared sequence
//! of updates, so collectors and stores can be exercised without a broker.
//!
//! # Features
//!
//! - **Failure injection**: fail after a given number of updates
//! - **Latency simulation**: delay each update to mimic a slow transport

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};
use crate::traits::{TelemetrySource, TelemetryUpdate};

/// A telemetry source that replays prepared updates.
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use zigsight_core::{ReplaySource, TelemetrySource};
///
/// #[tokio::main]
/// async fn main() {
///     let mut source = ReplaySource::new("replay")
///         .device("sensor", json!({"battery": 90}))
///         .bridge(json!("online"));
///
///     let mut count = 0;
///     while let Some(_update) = source.next_update().await.unwrap() {
///         count += 1;
///     }
///     assert_eq!(count, 2);
/// }
/// ```
#[derive(Debug)]
pub struct ReplaySource {
    name: String,
    updates: VecDeque<TelemetryUpdate>,
    latency: Duration,
    fail_after: Option<(usize, String)>,
    delivered: usize,
    closed: Arc<AtomicBool>,
}

impl ReplaySource {
    /// Create an empty replay source.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            updates: VecDeque::new(),
            latency: Duration::ZERO,
            fail_after: None,
            delivered: 0,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Create a source from a list of updates.
    pub fn from_updates(
        name: impl Into<String>,
        updates: impl IntoIterator<Item = TelemetryUpdate>,
    ) -> Self {
        let mut source = Self::new(name);
        source.updates.extend(updates);
        source
    }

    /// Queue a raw message, routed like a live message would be.
    ///
    /// Messages that would be dropped on the wire (non-object device
    /// payloads) are dropped here too.
    #[must_use]
    pub fn message(mut self, device_id: &str, payload: Value) -> Self {
        if let Some(update) = TelemetryUpdate::from_message(device_id, payload) {
            self.updates.push_back(update);
        }
        self
    }

    /// Queue a device update.
    #[must_use]
    pub fn device(self, device_id: &str, payload: Value) -> Self {
        self.message(device_id, payload)
    }

    /// Queue a bridge state update.
    #[must_use]
    pub fn bridge(mut self, state: Value) -> Self {
        self.updates.push_back(TelemetryUpdate::Bridge { state });
        self
    }

    /// Delay every update by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail with `message` once `count` updates have been delivered.
    #[must_use]
    pub fn fail_after(mut self, count: usize, message: impl Into<String>) -> Self {
        self.fail_after = Some((count, message.into()));
        self
    }

    /// Number of updates not yet delivered.
    pub fn remaining(&self) -> usize {
        self.updates.len()
    }

    /// Number of updates delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Handle that reports whether [`close`](TelemetrySource::close) was called.
    ///
    /// Useful when the source itself is moved into a collector.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }

    /// Whether the source was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl TelemetrySource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next_update(&mut self) -> Result<Option<TelemetryUpdate>> {
        if self.is_closed() {
            return Ok(None);
        }

        if let Some((count, message)) = &self.fail_after
            && self.delivered >= *count
        {
            return Err(Error::source_failed(&self.name, message.clone()));
        }

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let update = self.updates.pop_front();
        if update.is_some() {
            self.delivered += 1;
        }
        Ok(update)
    }

    async fn close(&mut self) -> Result<()> {
        debug!(
            "Closing replay source {} with {} updates left",
            self.name,
            self.updates.len()
        );
        self.closed.store(true, Ordering::Relaxed);
        self.updates.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_replay_in_order() {
        let mut source = ReplaySource::new("replay")
            .device("a", json!({"battery": 90}))
            .bridge(json!("online"))
            .device("b", json!({"linkquality": 80}));
        assert_eq!(source.remaining(), 3);

        let first = source.next_update().await.unwrap().unwrap();
        assert!(matches!(first, TelemetryUpdate::Device { ref device_id, .. } if device_id == "a"));
        let second = source.next_update().await.unwrap().unwrap();
        assert!(matches!(second, TelemetryUpdate::Bridge { .. }));
        let third = source.next_update().await.unwrap().unwrap();
        assert!(matches!(third, TelemetryUpdate::Device { ref device_id, .. } if device_id == "b"));

        assert!(source.next_update().await.unwrap().is_none());
        assert_eq!(source.delivered(), 3);
    }

    #[tokio::test]
    async fn test_message_routing_drops_non_objects() {
        let mut source = ReplaySource::new("replay")
            .message("sensor", json!("garbage"))
            .message("bridge", json!("offline"));
        assert_eq!(source.remaining(), 1);
        assert!(matches!(
            source.next_update().await.unwrap(),
            Some(TelemetryUpdate::Bridge { .. })
        ));
    }

    #[tokio::test]
    async fn test_fail_after() {
        let mut source = ReplaySource::new("flaky")
            .device("a", json!({}))
            .device("b", json!({}))
            .fail_after(1, "connection reset");

        assert!(source.next_update().await.unwrap().is_some());
        let err = source.next_update().await.unwrap_err();
        assert!(err.to_string().contains("flaky"));
        assert!(err.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn test_close_stops_delivery() {
        let mut source = ReplaySource::new("replay").device("a", json!({}));
        let flag = source.closed_flag();

        source.close().await.unwrap();
        assert!(flag.load(Ordering::Relaxed));
        assert!(source.is_closed());
        assert!(source.next_update().await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency() {
        let mut source = ReplaySource::new("slow")
            .device("a", json!({}))
            .with_latency(Duration::from_secs(2));

        let start = tokio::time::Instant::now();
        assert!(source.next_update().await.unwrap().is_some());
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_from_updates() {
        let source = ReplaySource::from_updates(
            "replay",
            vec![TelemetryUpdate::Bridge {
                state: json!("online"),
            }],
        );
        assert_eq!(source.remaining(), 1);
        assert_eq!(source.name(), "replay");
    }
}
