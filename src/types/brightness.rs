//! Brightness control for the whole panel array.

use serde::{Deserialize, Serialize};

/// Brightness level from 0 to 100 percent.
///
/// The device only accepts whole percentages, so every constructor that takes
/// a fractional value truncates toward zero.
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct Brightness {
    pub(crate) value: u8,
}

impl Brightness {
    const MIN: u8 = 0;
    const MAX: u8 = 100;
    /// Upper bound of the 0-255 scale used by light entities.
    pub const LEVEL_MAX: u8 = 255;

    pub fn new() -> Self {
        Brightness { value: Self::MAX }
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Returns None if value is outside valid range (0-100).
    pub fn create(value: u8) -> Option<Self> {
        if Self::is_valid(value) {
            Some(Brightness { value })
        } else {
            None
        }
    }

    /// Returns default (100%) if value is invalid.
    pub fn create_or(value: u8) -> Self {
        Self::create(value).unwrap_or_else(Self::new)
    }

    /// Truncate a fractional percentage. Returns None outside 0-100 or for NaN.
    pub fn from_percent(percent: f64) -> Option<Self> {
        if !percent.is_finite() || percent < f64::from(Self::MIN) || percent > f64::from(Self::MAX)
        {
            return None;
        }
        Some(Brightness {
            value: percent.trunc() as u8,
        })
    }

    /// Convert a 0-255 entity level into a percentage.
    pub fn from_level(level: u8) -> Self {
        let value = u16::from(level) * u16::from(Self::MAX) / u16::from(Self::LEVEL_MAX);
        Brightness { value: value as u8 }
    }

    /// Convert back to the 0-255 entity scale.
    pub fn to_level(&self) -> u8 {
        let level = u16::from(self.value) * u16::from(Self::LEVEL_MAX) / u16::from(Self::MAX);
        level as u8
    }

    fn is_valid(value: u8) -> bool {
        (Self::MIN..=Self::MAX).contains(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_percent_truncates() {
        assert_eq!(Brightness::from_percent(49.9).unwrap().value(), 49);
        assert_eq!(Brightness::from_percent(100.0).unwrap().value(), 100);
        assert!(Brightness::from_percent(100.5).is_none());
        assert!(Brightness::from_percent(-1.0).is_none());
        assert!(Brightness::from_percent(f64::NAN).is_none());
    }

    #[test]
    fn test_level_conversion() {
        assert_eq!(Brightness::from_level(255).value(), 100);
        assert_eq!(Brightness::from_level(128).value(), 50);
        assert_eq!(Brightness::from_level(0).value(), 0);
        assert_eq!(Brightness::create(50).unwrap().to_level(), 127);
        assert_eq!(Brightness::new().to_level(), 255);
    }

    #[test]
    fn test_create_or_falls_back() {
        assert_eq!(Brightness::create_or(101).value(), 100);
        assert_eq!(Brightness::create_or(0).value(), 0);
    }
}
