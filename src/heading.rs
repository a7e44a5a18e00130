//! Raw magnetometer samples to compass headings.
//!
//! The heading is taken from the X/Y plane only, so the device is assumed to
//! be held flat. No tilt compensation or declination correction is applied.

use crate::compass::{normalize_degrees, shortest_delta};

/// One raw reading of the ambient magnetic field, in sensor units.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagnetometerSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl MagnetometerSample {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Convert a sample to a heading in [0, 360).
///
/// `calibration_offset` is subtracted from the raw sensor angle so that 0
/// lines up with the device's visual "up". A zero field reading yields 0
/// instead of NaN.
pub fn normalize_heading(sample: &MagnetometerSample, calibration_offset: f64) -> f64 {
    if sample.x == 0.0 && sample.y == 0.0 {
        return 0.0;
    }

    let raw_angle = sample.y.atan2(sample.x).to_degrees();
    let heading = normalize_degrees(normalize_degrees(raw_angle) - calibration_offset);

    if heading.is_finite() { heading } else { 0.0 }
}

/// Exponential moving average filter for heading values.
///
/// Interpolates along the shortest arc, so 350° → 10° moves through north.
/// `alpha = 1.0` passes headings through unchanged; lower values smooth more.
#[derive(Clone, Debug)]
pub struct HeadingFilter {
    alpha: f64,
    prev_heading: Option<f64>,
}

/// Smallest factor the filter will use.
const MIN_ALPHA: f64 = 0.01;

impl HeadingFilter {
    /// Alpha is clamped to [0.01, 1.0].
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_nan() { 1.0 } else { alpha };
        Self {
            alpha: alpha.clamp(MIN_ALPHA, 1.0),
            prev_heading: None,
        }
    }

    /// The first call returns the raw heading unchanged.
    pub fn apply(&mut self, heading: f64) -> f64 {
        let smoothed = match self.prev_heading {
            None => heading,
            Some(prev) => normalize_degrees(prev + self.alpha * shortest_delta(prev, heading)),
        };
        self.prev_heading = Some(smoothed);
        smoothed
    }

    pub fn reset(&mut self) {
        self.prev_heading = None;
    }
}
