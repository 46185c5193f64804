//! Request bodies for state-changing REST calls.

use serde::{Deserialize, Serialize};

use crate::types::{Brightness, Rgb, Transition};

/// Body of `PUT /api/v1/{token}/state/brightness`.
///
/// Unlike the effect animation, the brightness `duration` is in whole
/// seconds.
///
/// # Examples
///
/// ```
/// use nanoleaf_panels_rs::{Brightness, BrightnessPayload, Transition};
///
/// let payload = BrightnessPayload::new(Brightness::create(50).unwrap(), Transition::from_tenths(20));
/// assert_eq!(
///     serde_json::to_string(&payload).unwrap(),
///     r#"{"brightness":{"value":50,"duration":2}}"#
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrightnessPayload {
    brightness: BrightnessValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BrightnessValue {
    value: Brightness,
    duration: u32,
}

impl BrightnessPayload {
    pub fn new(value: Brightness, transition: Transition) -> Self {
        Self {
            brightness: BrightnessValue {
                value,
                duration: transition.whole_secs(),
            },
        }
    }
}

/// Body of `PUT /api/v1/{token}/effects`.
///
/// Only the single-frame static animation is built here: one panel, one
/// frame, white channel forced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectPayload {
    write: EffectWrite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EffectWrite {
    command: String,
    anim_type: String,
    anim_data: String,
    #[serde(rename = "loop")]
    looping: bool,
    palette: Vec<serde_json::Value>,
    brightness_range: BrightnessRange,
    color_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BrightnessRange {
    min_value: u8,
    max_value: u8,
}

impl EffectPayload {
    /// Paint a single panel with a static color.
    ///
    /// # Examples
    ///
    /// ```
    /// use nanoleaf_panels_rs::{EffectPayload, Rgb, Transition};
    ///
    /// let payload = EffectPayload::static_color(123, Rgb::new(255, 0, 0), Transition::from_tenths(10));
    /// assert_eq!(payload.anim_data(), "1 123 1 255 0 0 0 10");
    /// ```
    pub fn static_color(panel_id: u32, rgb: Rgb, transition: Transition) -> Self {
        let white = 0;
        Self {
            write: EffectWrite {
                command: "display".into(),
                anim_type: "static".into(),
                anim_data: format!(
                    "1 {} 1 {} {} {} {} {}",
                    panel_id,
                    rgb.red,
                    rgb.green,
                    rgb.blue,
                    white,
                    transition.tenths()
                ),
                looping: false,
                palette: Vec::new(),
                brightness_range: BrightnessRange {
                    min_value: 0,
                    max_value: 255,
                },
                color_type: "HSB".into(),
            },
        }
    }

    pub fn anim_data(&self) -> &str {
        &self.write.anim_data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_static_effect_body() {
        let payload = EffectPayload::static_color(7, Rgb::new(1, 2, 3), Transition::from_tenths(0));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "write": {
                    "command": "display",
                    "animType": "static",
                    "animData": "1 7 1 1 2 3 0 0",
                    "loop": false,
                    "palette": [],
                    "brightnessRange": {"minValue": 0, "maxValue": 255},
                    "colorType": "HSB"
                }
            })
        );
    }
}
