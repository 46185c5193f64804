//! Device snapshot returned by `GET /api/v1/{token}`.

use serde::{Deserialize, Serialize};

/// `shapeType` of a controllable light panel. Other shapes (controllers,
/// connectors) are decorative and never become entities.
pub const LIGHT_PANEL_SHAPE: u32 = 9;

/// Full self-description of a controller, fetched once and cached.
#[serde_with::skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSnapshot {
    pub name: String,
    #[serde(default)]
    pub serial_no: String,
    #[serde(default)]
    pub manufacturer: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub firmware_version: Option<String>,
    #[serde(default)]
    pub hardware_version: Option<String>,
    pub state: DeviceState,
    pub panel_layout: PanelLayout,
}

impl DeviceSnapshot {
    /// Panels whose shape marks them as addressable lights, in layout order.
    pub fn controllable_panels(&self, light_shape_type: u32) -> Vec<&PanelDescriptor> {
        self.panel_layout
            .layout
            .position_data
            .iter()
            .filter(|panel| panel.shape_type == light_shape_type)
            .collect()
    }

    /// Current brightness on the 0-255 entity scale.
    pub fn brightness_level(&self) -> u8 {
        self.state.brightness.level()
    }

    pub fn is_on(&self) -> bool {
        self.state.on.value
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    pub on: OnState,
    pub brightness: BrightnessState,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnState {
    pub value: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessState {
    pub value: u32,
    #[serde(default)]
    pub min: u32,
    #[serde(default = "BrightnessState::default_max")]
    pub max: u32,
}

impl BrightnessState {
    fn default_max() -> u32 {
        100
    }

    /// `trunc(255 * value / max)`, clamped to the scale.
    pub fn level(&self) -> u8 {
        if self.max == 0 {
            return 0;
        }
        let level = u64::from(self.value) * 255 / u64::from(self.max);
        level.min(255) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelLayout {
    pub layout: Layout,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    #[serde(default)]
    pub num_panels: u32,
    #[serde(default)]
    pub side_length: u32,
    #[serde(default)]
    pub position_data: Vec<PanelDescriptor>,
}

/// One shape in the physical layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelDescriptor {
    pub panel_id: u32,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(rename = "o", default)]
    pub orientation: i32,
    pub shape_type: u32,
}


#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> DeviceSnapshot {
        serde_json::from_value(fixtures::snapshot_json()).unwrap()
    }

    #[test]
    fn test_parse_snapshot() {
        let snap = snapshot();
        assert_eq!(snap.name, "Shapes 4F2A");
        assert_eq!(snap.serial_no, "S19124C8036");
        assert_eq!(snap.firmware_version.as_deref(), Some("9.2.4"));
        assert!(snap.is_on());
        assert_eq!(snap.panel_layout.layout.position_data[2].orientation, 120);
    }

    #[test]
    fn test_only_light_shapes_are_controllable() {
        let snap = snapshot();
        let ids: Vec<u32> = snap
            .controllable_panels(LIGHT_PANEL_SHAPE)
            .iter()
            .map(|p| p.panel_id)
            .collect();
        assert_eq!(ids, vec![123, 456]);
        assert!(snap.controllable_panels(7).is_empty());
    }

    #[test]
    fn test_brightness_level() {
        assert_eq!(snapshot().brightness_level(), 102);
        let zero_max = BrightnessState {
            value: 10,
            min: 0,
            max: 0,
        };
        assert_eq!(zero_max.level(), 0);
    }
}
