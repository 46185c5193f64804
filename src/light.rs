//! Light entity for a single panel.

use std::sync::Arc;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::client::DeviceClient;
use crate::errors::Error;
use crate::snapshot::{DeviceSnapshot, PanelDescriptor};
use crate::types::{Brightness, Rgb, Transition};

type Result<T> = std::result::Result<T, Error>;

/// Domain the integration registers its devices under.
pub const DOMAIN: &str = "nanoleaf_panels";

/// Attributes requested by a turn-on call. All optional.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnOnParams {
    /// Brightness on the 0-255 scale.
    pub brightness: Option<u8>,
    pub rgb: Option<Rgb>,
    /// Transition in seconds.
    pub transition: Option<f64>,
}

impl TurnOnParams {
    pub fn is_empty(&self) -> bool {
        self.brightness.is_none() && self.rgb.is_none() && self.transition.is_none()
    }
}

/// Device metadata shown alongside the entities.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub identifiers: Vec<(String, String)>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
    pub sw_version: Option<String>,
    pub hw_version: Option<String>,
    pub configuration_url: String,
}

impl DeviceInfo {
    pub fn from_snapshot(snapshot: &DeviceSnapshot, configuration_url: String) -> Self {
        DeviceInfo {
            identifiers: vec![(DOMAIN.to_string(), snapshot.name.clone())],
            name: snapshot.name.clone(),
            manufacturer: snapshot.manufacturer.clone(),
            model: snapshot.model.clone(),
            sw_version: snapshot.firmware_version.clone(),
            hw_version: snapshot.hardware_version.clone(),
            configuration_url,
        }
    }
}

/// One addressable panel exposed as an RGB light.
///
/// State is optimistic: it reflects what this entity last asked for, seeded
/// from the device snapshot.
#[derive(Debug, Clone)]
pub struct PanelLight {
    unique_id: u32,
    name: String,
    is_on: bool,
    brightness: u8,
    rgb: Rgb,
    transition: f64,
    client: Arc<DeviceClient>,
    device_info: DeviceInfo,
}

impl PanelLight {
    const DEFAULT_TRANSITION_SECS: f64 = 1.0;

    pub fn new(
        panel: &PanelDescriptor,
        name: &str,
        client: Arc<DeviceClient>,
        snapshot: &DeviceSnapshot,
    ) -> Self {
        let device_info = DeviceInfo::from_snapshot(snapshot, client.endpoint().configuration_url());
        PanelLight {
            unique_id: panel.panel_id,
            name: name.to_string(),
            is_on: snapshot.is_on(),
            brightness: snapshot.brightness_level(),
            rgb: Rgb::WHITE,
            transition: Self::DEFAULT_TRANSITION_SECS,
            client,
            device_info,
        }
    }

    /// Build one light per controllable panel, named `Panel01`, `Panel02`, ...
    pub fn from_snapshot(
        snapshot: &DeviceSnapshot,
        client: &Arc<DeviceClient>,
        light_shape_type: u32,
    ) -> Vec<Self> {
        snapshot
            .controllable_panels(light_shape_type)
            .into_iter()
            .enumerate()
            .map(|(i, panel)| {
                PanelLight::new(
                    panel,
                    &format!("Panel{:02}", i + 1),
                    Arc::clone(client),
                    snapshot,
                )
            })
            .collect()
    }

    pub fn unique_id(&self) -> u32 {
        self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_on(&self) -> bool {
        self.is_on
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn rgb(&self) -> Rgb {
        self.rgb
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    /// Apply brightness and/or color. With no params at all, paints white.
    ///
    /// Brightness applies to the whole array; color only to this panel.
    /// A failed brightness call marks the light off but the color is still
    /// applied; the brightness error is returned once both steps ran.
    pub async fn turn_on(&mut self, params: TurnOnParams) -> Result<()> {
        let default_rgb = params.is_empty().then_some(Rgb::WHITE);

        if let Some(secs) = params.transition {
            self.transition = secs;
        }
        let transition = Transition::from_secs_f64(self.transition);

        let mut brightness_error = None;
        if let Some(level) = params.brightness {
            match self
                .client
                .set_brightness(Brightness::from_level(level), transition)
                .await
            {
                Ok(applied) => {
                    self.brightness = applied.to_level();
                    self.is_on = applied.value() > 0;
                }
                Err(e) => {
                    warn!("{}: brightness not applied: {e}", self.name);
                    self.is_on = false;
                    brightness_error = Some(e);
                }
            }
        }

        if let Some(rgb) = params.rgb.or(default_rgb) {
            self.rgb = rgb;
            self.is_on = self
                .client
                .display_static_color(self.unique_id, rgb, transition)
                .await?;
        }

        debug!("{} on={} rgb={:?}", self.name, self.is_on, self.rgb);
        brightness_error.map_or(Ok(()), Err)
    }

    /// Paint the panel black over one second.
    pub async fn turn_off(&mut self) -> Result<()> {
        self.rgb = Rgb::BLACK;
        self.is_on = false;
        self.client
            .display_static_color(
                self.unique_id,
                self.rgb,
                Transition::from_secs_f64(Self::DEFAULT_TRANSITION_SECS),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEndpoint;
    use crate::snapshot::{LIGHT_PANEL_SHAPE, fixtures};

    fn snapshot() -> DeviceSnapshot {
        serde_json::from_value(fixtures::snapshot_json()).unwrap()
    }

    fn client() -> Arc<DeviceClient> {
        Arc::new(DeviceClient::new(
            DeviceEndpoint::new("192.168.1.36", 16021),
            Some("tok"),
        ))
    }

    #[test]
    fn test_one_light_per_light_panel() {
        let lights = PanelLight::from_snapshot(&snapshot(), &client(), LIGHT_PANEL_SHAPE);
        let names: Vec<(&str, u32)> = lights.iter().map(|l| (l.name(), l.unique_id())).collect();
        assert_eq!(names, vec![("Panel01", 123), ("Panel02", 456)]);
    }

    #[test]
    fn test_initial_state_from_snapshot() {
        let lights = PanelLight::from_snapshot(&snapshot(), &client(), LIGHT_PANEL_SHAPE);
        let light = &lights[0];
        assert!(light.is_on());
        assert_eq!(light.brightness(), 102);
        assert_eq!(light.rgb(), Rgb::WHITE);
    }

    #[test]
    fn test_device_info() {
        let lights = PanelLight::from_snapshot(&snapshot(), &client(), LIGHT_PANEL_SHAPE);
        let info = lights[0].device_info();
        assert_eq!(
            info.identifiers,
            vec![(DOMAIN.to_string(), "Shapes 4F2A".to_string())]
        );
        assert_eq!(info.sw_version.as_deref(), Some("9.2.4"));
        assert_eq!(info.configuration_url, "http://192.168.1.36");
    }

    #[test]
    fn test_empty_params() {
        assert!(TurnOnParams::default().is_empty());
        assert!(
            !TurnOnParams {
                transition: Some(2.0),
                ..Default::default()
            }
            .is_empty()
        );
    }
}
