//! Gesture records, published domain events, and the event bus.

use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::broadcast;

use crate::errors::Error;
use crate::registry::EntityRef;

type Result<T> = std::result::Result<T, Error>;

/// Name the domain events are fired under on the host bus.
pub const EVENT_NAME: &str = "nanoleaf_panels_event";

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Kind of tap attributed to a panel.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TapType {
    SingleTap,
    DoubleTap,
}

impl TapType {
    /// Map a device gesture code. Codes other than 0 and 1 exist (swipes)
    /// but are not mapped yet.
    pub fn from_gesture(gesture: i64) -> Option<Self> {
        match gesture {
            0 => Some(TapType::SingleTap),
            1 => Some(TapType::DoubleTap),
            _ => None,
        }
    }
}

/// One `{panelId, gesture}` record as sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GestureEvent {
    pub panel_id: u32,
    pub gesture: i64,
}

/// Payload of a `data:` line.
#[derive(Debug, Deserialize)]
struct StreamFrame {
    events: Vec<serde_json::Value>,
}

impl GestureEvent {
    /// Decode a frame payload and return its first record.
    ///
    /// Frames may carry several records; only index 0 is consulted.
    pub fn from_frame(payload: &str) -> Result<Self> {
        let frame: StreamFrame = serde_json::from_str(payload).map_err(Error::JsonLoad)?;
        let first = frame
            .events
            .into_iter()
            .next()
            .ok_or_else(|| Error::MalformedPayload("empty events list".into()))?;
        serde_json::from_value(first).map_err(|e| Error::MalformedPayload(e.to_string()))
    }
}

/// Event published when a gesture is attributed to a registered entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainEvent {
    pub device_id: String,
    pub entity_id: String,
    #[serde(rename = "type")]
    pub tap: TapType,
}

impl DomainEvent {
    pub fn new(entity: EntityRef, tap: TapType) -> Self {
        DomainEvent {
            device_id: entity.device_id,
            entity_id: entity.entity_id,
            tap,
        }
    }
}

/// Where derived events go.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: DomainEvent);
}

/// Broadcast bus: every subscriber sees every event published after it
/// subscribed, in publish order.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<DomainEvent>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: DomainEvent) {
        debug!("{EVENT_NAME}: {event:?}");
        // No subscribers is fine; nobody is listening for taps right now.
        let _ = self.tx.send(Arc::new(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tap_type_names() {
        assert_eq!(TapType::SingleTap.to_string(), "single_tap");
        assert_eq!(TapType::from_str("double_tap").unwrap(), TapType::DoubleTap);
        assert!(TapType::from_str("swipe").is_err());
    }

    #[test]
    fn test_gesture_mapping() {
        assert_eq!(TapType::from_gesture(0), Some(TapType::SingleTap));
        assert_eq!(TapType::from_gesture(1), Some(TapType::DoubleTap));
        assert_eq!(TapType::from_gesture(2), None);
        assert_eq!(TapType::from_gesture(-1), None);
    }

    #[test]
    fn test_from_frame_uses_first_record() {
        let event = GestureEvent::from_frame(
            r#"{"events":[{"panelId":12,"gesture":1},{"panelId":13,"gesture":0}]}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            GestureEvent {
                panel_id: 12,
                gesture: 1
            }
        );
    }

    #[test]
    fn test_from_frame_rejects_bad_records() {
        assert!(GestureEvent::from_frame("not json").is_err());
        assert!(GestureEvent::from_frame(r#"{"events":[]}"#).is_err());
        assert!(GestureEvent::from_frame(r#"{"events":[{"panelId":12}]}"#).is_err());
        assert!(GestureEvent::from_frame(r#"{"events":[{"panelId":"12","gesture":0}]}"#).is_err());
        assert!(GestureEvent::from_frame(r#"{"other":1}"#).is_err());
    }

    #[test]
    fn test_domain_event_wire_shape() {
        let event = DomainEvent::new(
            EntityRef {
                device_id: "dev".into(),
                entity_id: "light.panel01".into(),
            },
            TapType::DoubleTap,
        );
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            serde_json::json!({"device_id": "dev", "entity_id": "light.panel01", "type": "double_tap"})
        );
    }

    #[tokio::test]
    async fn test_bus_delivers_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        for tap in [TapType::SingleTap, TapType::DoubleTap] {
            bus.publish(DomainEvent {
                device_id: "d".into(),
                entity_id: "e".into(),
                tap,
            });
        }
        assert_eq!(rx.recv().await.unwrap().tap, TapType::SingleTap);
        assert_eq!(rx.recv().await.unwrap().tap, TapType::DoubleTap);
    }
}
