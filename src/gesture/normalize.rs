use anyhow::{anyhow, Result};
use serde::Deserialize;

pub const DEFAULT_CALIBRATION_LOW: f32 = 0.5;
pub const DEFAULT_CALIBRATION_HIGH: f32 = 1.0;

/// Linear remap of a raw spread onto the `0..=1` control range.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct Calibration {
    /// Spread that maps to 0.
    pub low: f32,
    /// Spread that maps to 1.
    pub high: f32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            low: DEFAULT_CALIBRATION_LOW,
            high: DEFAULT_CALIBRATION_HIGH,
        }
    }
}

impl Calibration {
    pub fn new(low: f32, high: f32) -> Result<Self> {
        let calibration = Self { low, high };
        calibration.validate()?;
        Ok(calibration)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.low.is_finite() || !self.high.is_finite() {
            return Err(anyhow!("calibration bounds must be finite"));
        }
        if self.high <= self.low {
            return Err(anyhow!(
                "calibration high ({}) must be greater than low ({})",
                self.high,
                self.low
            ));
        }
        Ok(())
    }

    /// `clamp((spread - low) / (high - low), 0, 1)`. Non-finite input maps to 0.
    pub fn normalize(&self, spread: f32) -> f32 {
        let remapped = (spread - self.low) / (self.high - self.low);
        if remapped.is_nan() {
            return 0.0;
        }
        remapped.clamp(0.0, 1.0)
    }
}
