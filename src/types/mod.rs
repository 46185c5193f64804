//! Value types for panel control parameters.

mod brightness;
mod color;
mod transition;

pub use brightness::Brightness;
pub use color::Rgb;
pub use transition::Transition;
