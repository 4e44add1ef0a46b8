//! Trait abstractions for telemetry sources.
//!
//! This module provides the [`TelemetrySource`] trait that abstracts over
//! the MQTT bridge, vendor registries and replayed recordings used in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use zigsight_types::BRIDGE_DEVICE_ID;

use crate::error::Result;

/// A normalized inbound message from any telemetry source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TelemetryUpdate {
    /// A device published its state.
    Device {
        device_id: String,
        payload: Map<String, Value>,
    },
    /// The bridge published its state.
    Bridge { state: Value },
}

impl TelemetryUpdate {
    /// Route a raw `(device_id, payload)` message.
    ///
    /// Messages addressed to `"bridge"` become [`TelemetryUpdate::Bridge`].
    /// Other messages must carry a JSON object.
    ///
    /// ```
    /// use serde_json::json;
    /// use zigsight_core::TelemetryUpdate;
    ///
    /// let update = TelemetryUpdate::from_message("bridge", json!("online"));
    /// assert!(matches!(update, Some(TelemetryUpdate::Bridge { .. })));
    ///
    /// assert!(TelemetryUpdate::from_message("sensor", json!(42)).is_none());
    /// ```
    pub fn from_message(device_id: &str, payload: Value) -> Option<Self> {
        if device_id == BRIDGE_DEVICE_ID {
            return Some(TelemetryUpdate::Bridge { state: payload });
        }
        match payload {
            Value::Object(payload) => Some(TelemetryUpdate::Device {
                device_id: device_id.to_string(),
                payload,
            }),
            _ => None,
        }
    }
}

/// Trait abstracting a stream of telemetry.
///
/// Sources are driven by a single consumer that calls
/// [`next_update`](TelemetrySource::next_update) in a loop until it returns
/// `Ok(None)`. Transient transport failures should be handled inside the
/// source; an `Err` is treated as fatal by the consumer.
///
/// # Example
///
/// ```ignore
/// use zigsight_core::{DeviceStore, TelemetrySource, Result};
///
/// async fn drain<S: TelemetrySource>(source: &mut S, store: &mut DeviceStore) -> Result<()> {
///     while let Some(update) = source.next_update().await? {
///         store.apply(update);
///     }
///     source.close().await
/// }
/// ```
#[async_trait]
pub trait TelemetrySource: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Wait for the next update. `Ok(None)` means the source is exhausted.
    async fn next_update(&mut self) -> Result<Option<TelemetryUpdate>>;

    /// Release the underlying connection.
    ///
    /// The default implementation does nothing.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
