//! Entry lifecycle: set up a paired controller, and tear it down again.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::client::DeviceClient;
use crate::config::{EntryData, IntegrationOptions};
use crate::errors::Error;
use crate::events::EventSink;
use crate::light::PanelLight;
use crate::registry::{
    ConfigEntryId, EntityRegistrar, EntityRegistry, LIGHT_DOMAIN, RegistryEntry,
};
use crate::stream::EventListener;
use crate::supervisor::{Supervisor, SupervisorHandle, SupervisorStatus};

type Result<T> = std::result::Result<T, Error>;

/// Lower-case a device or panel name into an id fragment.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

/// A set-up configuration entry: its lights and the running event stream.
#[derive(Debug)]
pub struct LoadedEntry {
    entry_id: ConfigEntryId,
    device_id: String,
    client: Arc<DeviceClient>,
    lights: Vec<PanelLight>,
    listener: Arc<EventListener>,
    supervisor: SupervisorHandle,
}

impl LoadedEntry {
    pub fn entry_id(&self) -> &ConfigEntryId {
        &self.entry_id
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn client(&self) -> &Arc<DeviceClient> {
        &self.client
    }

    pub fn lights(&self) -> &[PanelLight] {
        &self.lights
    }

    pub fn lights_mut(&mut self) -> &mut [PanelLight] {
        &mut self.lights
    }

    pub fn supervisor_status(&self) -> SupervisorStatus {
        self.supervisor.status()
    }

    /// Stop the event stream and wait for it to shut down.
    ///
    /// Registry rows stay; the host owns them.
    pub async fn unload(self) {
        info!("unloading {} ({})", self.device_id, self.entry_id);
        self.supervisor.stop().await;
    }

    pub async fn diagnostics(&self) -> Value {
        json!({
            "entry_id": self.entry_id.to_string(),
            "device_id": self.device_id,
            "lights": self.lights.iter().map(|l| json!({
                "name": l.name(),
                "unique_id": l.unique_id(),
                "is_on": l.is_on(),
                "brightness": l.brightness(),
            })).collect::<Vec<_>>(),
            "supervisor": serde_json::to_value(self.supervisor.status()).unwrap_or(Value::Null),
            "client": self.client.diagnostics().await,
            "listener": self.listener.diagnostics(),
        })
    }
}

/// Set up one paired controller.
///
/// Fetches the device snapshot, registers one light entity per panel under
/// `entry_id`, then starts the supervised event stream. If the snapshot
/// cannot be read nothing is registered and no stream is started.
pub async fn setup_entry<R>(
    entry_id: ConfigEntryId,
    data: EntryData,
    options: IntegrationOptions,
    registry: Arc<R>,
    sink: Arc<dyn EventSink>,
) -> Result<LoadedEntry>
where
    R: EntityRegistry + EntityRegistrar + 'static,
{
    let client = Arc::new(DeviceClient::with_options(
        data.host,
        Some(&data.token),
        &options,
    ));
    let snapshot = client.fetch_snapshot().await?;

    let device_id = slugify(&snapshot.name);
    let lights = PanelLight::from_snapshot(&snapshot, &client, options.light_shape_type);
    for light in &lights {
        let entity_id = format!("{LIGHT_DOMAIN}.{device_id}_{}", slugify(light.name()));
        debug!("registering {entity_id} for panel {}", light.unique_id());
        registry.register(RegistryEntry {
            entity_id,
            unique_id: light.unique_id().to_string(),
            device_id: device_id.clone(),
            domain: LIGHT_DOMAIN.to_string(),
            config_entry_id: entry_id,
        });
    }

    let listener = Arc::new(
        EventListener::new(
            Arc::clone(&client),
            entry_id,
            registry as Arc<dyn EntityRegistry>,
            sink,
        )
        .with_event_ids(options.event_ids.clone()),
    );
    let supervisor =
        Supervisor::spawn(Arc::clone(&listener), options.backoff, &CancellationToken::new());

    info!(
        "set up {} with {} panel lights at {}",
        snapshot.name,
        lights.len(),
        client.endpoint()
    );
    Ok(LoadedEntry {
        entry_id,
        device_id,
        client,
        lights,
        listener,
        supervisor,
    })
}

/// Loaded entries keyed by their configuration entry id.
#[derive(Debug, Default)]
pub struct Integration {
    entries: HashMap<ConfigEntryId, LoadedEntry>,
}

impl Integration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set up an entry and keep it. An entry already loaded under the same
    /// id is unloaded first.
    pub async fn load<R>(
        &mut self,
        entry_id: ConfigEntryId,
        data: EntryData,
        options: IntegrationOptions,
        registry: Arc<R>,
        sink: Arc<dyn EventSink>,
    ) -> Result<&LoadedEntry>
    where
        R: EntityRegistry + EntityRegistrar + 'static,
    {
        if let Some(previous) = self.entries.remove(&entry_id) {
            previous.unload().await;
        }
        let loaded = setup_entry(entry_id, data, options, registry, sink).await?;
        Ok(self.entries.entry(entry_id).or_insert(loaded))
    }

    pub fn get(&self, entry_id: &ConfigEntryId) -> Result<&LoadedEntry> {
        self.entries
            .get(entry_id)
            .ok_or(Error::EntryNotLoaded(*entry_id))
    }

    pub fn get_mut(&mut self, entry_id: &ConfigEntryId) -> Result<&mut LoadedEntry> {
        self.entries
            .get_mut(entry_id)
            .ok_or(Error::EntryNotLoaded(*entry_id))
    }

    pub async fn unload(&mut self, entry_id: &ConfigEntryId) -> Result<()> {
        let loaded = self
            .entries
            .remove(entry_id)
            .ok_or(Error::EntryNotLoaded(*entry_id))?;
        loaded.unload().await;
        Ok(())
    }

    /// Unload every entry.
    pub async fn shutdown(&mut self) {
        for (_, loaded) in self.entries.drain() {
            loaded.unload().await;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
