//! RGB color for a single panel.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// An RGB color with red, green, and blue components (0-255 each).
#[derive(Default, Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub(crate) red: u8,
    pub(crate) green: u8,
    pub(crate) blue: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);
    pub const BLACK: Rgb = Rgb::new(0, 0, 0);

    /// Create a color with the given RGB values.
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    pub fn red(&self) -> u8 {
        self.red
    }

    pub fn green(&self) -> u8 {
        self.green
    }

    pub fn blue(&self) -> u8 {
        self.blue
    }

    pub fn is_black(&self) -> bool {
        *self == Self::BLACK
    }
}

impl From<(u8, u8, u8)> for Rgb {
    fn from((red, green, blue): (u8, u8, u8)) -> Self {
        Self::new(red, green, blue)
    }
}

impl FromStr for Rgb {
    type Err = String;

    /// Parse from comma-separated string (e.g., "255,128,0").
    fn from_str(s: &str) -> Result<Self, String> {
        let parts = s
            .split(',')
            .map(|c| c.trim().parse::<u8>().map_err(|e| format!("{c:?}: {e}")))
            .collect::<Result<Vec<u8>, String>>()?;
        match parts.as_slice() {
            [r, g, b] => Ok(Self::new(*r, *g, *b)),
            _ => Err("Expected format: r,g,b".into()),
        }
    }
}
