//! # nanoleaf_panels_rs
//!
//! An async Rust integration for Nanoleaf light panels over the device's
//! local REST API.
//!
//! Each paired controller exposes every light panel of its layout as an
//! RGB light, and turns touch gestures on those panels into
//! `single_tap`/`double_tap` events that automations can trigger on.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use nanoleaf_panels_rs::{
//!     DeviceClient, DeviceEndpoint, EntryData, EventBus, InMemoryRegistry,
//!     IntegrationOptions, TurnOnParams, Rgb, setup_entry,
//! };
//! use uuid::Uuid;
//!
//! async fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     // Pair once, while the controller's power button is held.
//!     let client = DeviceClient::new("192.168.1.36".parse()?, None);
//!     let token = client.acquire_token().await?;
//!
//!     // Later: set the entry up and listen for taps.
//!     let data = EntryData { host: client.endpoint().clone(), token };
//!     let bus = EventBus::new();
//!     let mut events = bus.subscribe();
//!     let mut entry = setup_entry(
//!         Uuid::new_v4(),
//!         data,
//!         IntegrationOptions::default(),
//!         Arc::new(InMemoryRegistry::new()),
//!         Arc::new(bus.clone()),
//!     )
//!     .await?;
//!
//!     entry.lights_mut()[0]
//!         .turn_on(TurnOnParams { rgb: Some(Rgb::new(255, 0, 0)), ..Default::default() })
//!         .await?;
//!
//!     while let Ok(event) = events.recv().await {
//!         println!("{} on {}", event.tap, event.entity_id);
//!     }
//!     entry.unload().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Panel lights**: one [`PanelLight`] per light panel, with brightness
//!   and per-panel static color
//! - **Touch events**: [`EventListener`] reads the device's event stream and
//!   publishes [`DomainEvent`]s on an [`EventBus`]
//! - **Reconnects**: [`Supervisor`] keeps the stream open, backing off per
//!   [`BackoffPolicy`]
//! - **Pairing**: [`ConfigFlow`] walks a host or a [`DiscoveryRecord`] to a
//!   stored [`EntryData`]
//! - **Automations**: [`device_triggers`] and [`attach_trigger`]
//! - **Diagnostics**: bounded [`MessageHistory`] per client and listener
//!
//! ## Communication
//!
//! All communication is plain HTTP to port 16021 of the controller. Every
//! call except pairing needs the token obtained with
//! [`DeviceClient::acquire_token`].

mod client;
mod config;
mod config_flow;
mod errors;
mod events;
mod history;
mod integration;
mod light;
mod payload;
mod registry;
mod snapshot;
mod stream;
mod supervisor;
mod triggers;
mod types;

// Re-export public API
pub use client::DeviceClient;
pub use config::{DeviceEndpoint, EntryData, IntegrationOptions};
pub use config_flow::{
    AbortReason, ConfigFlow, DISCOVERY_ID_KEY, DISCOVERY_NAME_KEY, DiscoveryRecord, FlowResult,
    FlowStep,
};
pub use errors::Error;
pub use events::{DomainEvent, EVENT_NAME, EventBus, EventSink, GestureEvent, TapType};
pub use history::{HistoryEntry, HistorySummary, MessageHistory, MessageType};
pub use integration::{Integration, LoadedEntry, setup_entry};
pub use light::{DOMAIN, DeviceInfo, PanelLight, TurnOnParams};
pub use payload::{BrightnessPayload, EffectPayload};
pub use registry::{
    ConfigEntryId, EntityRef, EntityRegistrar, EntityRegistry, InMemoryRegistry, LIGHT_DOMAIN,
    RegistryEntry, resolve,
};
pub use snapshot::{
    BrightnessState, DeviceSnapshot, DeviceState, LIGHT_PANEL_SHAPE, Layout, OnState, PanelDescriptor,
    PanelLayout,
};
pub use stream::{EventListener, EventStream, StreamEnd, StreamSession};
pub use supervisor::{BackoffPolicy, Supervisor, SupervisorHandle, SupervisorState, SupervisorStatus};
pub use triggers::{TriggerConfig, TriggerSubscription, attach_trigger, device_triggers};
pub use types::{Brightness, Rgb, Transition};
