//! Transition duration in the device's native unit.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A transition duration expressed in tenths of a second.
///
/// Light entities work in seconds; the REST surface works in tenths. The
/// conversion happens here and nowhere else.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(transparent)]
pub struct Transition {
    tenths: u32,
}

impl Default for Transition {
    /// One second.
    fn default() -> Self {
        Self::from_tenths(10)
    }
}

impl Transition {
    pub const fn from_tenths(tenths: u32) -> Self {
        Self { tenths }
    }

    /// Round a user-facing duration in seconds to the nearest tenth.
    /// Negative or non-finite inputs become an instant transition.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::from_tenths(0);
        }
        let tenths = (secs * 10.0).round().min(f64::from(u32::MAX));
        Self::from_tenths(tenths as u32)
    }

    pub fn tenths(&self) -> u32 {
        self.tenths
    }

    /// Whole seconds, rounded half up.
    pub fn whole_secs(&self) -> u32 {
        self.tenths.saturating_add(5) / 10
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.tenths) * 100)
    }
}

impl From<Duration> for Transition {
    fn from(duration: Duration) -> Self {
        Self::from_secs_f64(duration.as_secs_f64())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seconds_to_tenths() {
        assert_eq!(Transition::from_secs_f64(1.0).tenths(), 10);
        assert_eq!(Transition::from_secs_f64(0.25).tenths(), 3);
        assert_eq!(Transition::from_secs_f64(-2.0).tenths(), 0);
        assert_eq!(Transition::from(Duration::from_millis(1500)).tenths(), 15);
        assert_eq!(Transition::default().as_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_whole_secs() {
        assert_eq!(Transition::from_tenths(20).whole_secs(), 2);
        assert_eq!(Transition::from_tenths(14).whole_secs(), 1);
        assert_eq!(Transition::from_tenths(15).whole_secs(), 2);
        assert_eq!(Transition::from_tenths(0).whole_secs(), 0);
    }
}
