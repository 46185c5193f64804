//! Device triggers: which tap events a device offers, and subscriptions
//! that fire on a matching event.

use std::str::FromStr;
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::errors::Error;
use crate::events::{DomainEvent, EventBus, TapType};
use crate::light::DOMAIN;
use crate::registry::EntityRegistry;

type Result<T> = std::result::Result<T, Error>;

/// A trigger as offered to (and configured by) the automation editor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub platform: String,
    pub domain: String,
    pub device_id: String,
    pub entity_id: String,
    #[serde(rename = "type")]
    pub trigger_type: String,
}

impl TriggerConfig {
    pub fn new(device_id: &str, entity_id: &str, tap: TapType) -> Self {
        TriggerConfig {
            platform: "device".into(),
            domain: DOMAIN.into(),
            device_id: device_id.into(),
            entity_id: entity_id.into(),
            trigger_type: tap.to_string(),
        }
    }

    /// Check the trigger type and return it parsed.
    pub fn validate(&self) -> Result<TapType> {
        TapType::from_str(&self.trigger_type)
            .map_err(|_| Error::InvalidTrigger(self.trigger_type.clone()))
    }

    fn matches(&self, tap: TapType, event: &DomainEvent) -> bool {
        event.tap == tap && event.device_id == self.device_id && event.entity_id == self.entity_id
    }
}

/// Every trigger a device offers: one per tap type per entity.
pub fn device_triggers<R>(registry: &R, device_id: &str) -> Vec<TriggerConfig>
where
    R: EntityRegistry + ?Sized,
{
    registry
        .entries_for_device(device_id)
        .iter()
        .filter(|entry| entry.device_id == device_id)
        .flat_map(|entry| {
            TapType::iter().map(move |tap| TriggerConfig::new(device_id, &entry.entity_id, tap))
        })
        .collect()
}

/// A live subscription created by [`attach_trigger`].
#[derive(Debug)]
pub struct TriggerSubscription {
    config: TriggerConfig,
    tap: TapType,
    rx: broadcast::Receiver<Arc<DomainEvent>>,
}

impl TriggerSubscription {
    pub fn config(&self) -> &TriggerConfig {
        &self.config
    }

    /// Wait for the next matching event. Returns None once the bus is gone.
    pub async fn next(&mut self) -> Option<Arc<DomainEvent>> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.config.matches(self.tap, &event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("trigger {:?} skipped {n} events", self.config.entity_id);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

/// Validate `config` and subscribe it to the bus.
pub fn attach_trigger(config: TriggerConfig, bus: &EventBus) -> Result<TriggerSubscription> {
    let tap = config.validate()?;
    Ok(TriggerSubscription {
        config,
        tap,
        rx: bus.subscribe(),
    })
}
