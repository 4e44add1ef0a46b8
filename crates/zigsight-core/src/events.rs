//! Device update notifications.
//!
//! The store publishes an event for every processed message. Consumers
//! (WebSocket clients, loggers) subscribe through an [`EventDispatcher`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::broadcast;

use zigsight_types::MetricsSnapshot;

/// Events emitted by the device store.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum DeviceEvent {
    /// A device message was processed.
    Updated {
        device_id: String,
        metrics: MetricsSnapshot,
    },
    /// A gap in a device's reporting was counted as a reconnect.
    Reconnected {
        device_id: String,
        reconnect_count: u32,
        #[serde(with = "time::serde::rfc3339")]
        at: OffsetDateTime,
    },
    /// The bridge published a new state.
    BridgeState { state: Value },
}

impl DeviceEvent {
    /// The device this event concerns, if any.
    pub fn device_id(&self) -> Option<&str> {
        match self {
            DeviceEvent::Updated { device_id, .. } | DeviceEvent::Reconnected { device_id, .. } => {
                Some(device_id)
            }
            DeviceEvent::BridgeState { .. } => None,
        }
    }
}

/// Sender for device events.
pub type EventSender = broadcast::Sender<DeviceEvent>;

/// Receiver for device events.
pub type EventReceiver = broadcast::Receiver<DeviceEvent>;

/// Event dispatcher for sending events to multiple receivers.
///
/// Slow receivers lose the oldest events instead of blocking the sender.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribe to events.
    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Send an event.
    pub fn send(&self, event: DeviceEvent) {
        // Ignore error if no receivers
        let _ = self.sender.send(event);
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}
