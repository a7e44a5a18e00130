//! Dial and pointer angles for rendering.
//!
//! The dial is drawn rotated by `-heading` so north stays up on screen. The
//! qibla pointer is painted on the dial face at the absolute bearing, so it
//! rides along with the dial; its on-screen angle is `bearing - heading`
//! without any further correction.

use crate::compass::normalize_degrees;

/// Rotations to hand to the renderer. Holds no state of its own.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RotationPair {
    /// Rotation applied to the whole dial, in degrees.
    pub dial_rotation_degrees: f64,
    /// Angle of the pointer inside the dial's own frame.
    pub pointer_rotation_degrees: f64,
}

impl RotationPair {
    /// Where the pointer ends up on screen, in [0, 360), after the dial rotation.
    pub fn indicator_screen_degrees(&self) -> f64 {
        normalize_degrees(self.pointer_rotation_degrees + self.dial_rotation_degrees)
    }
}

pub fn compose_rotation(heading: f64, bearing: f64) -> RotationPair {
    RotationPair {
        dial_rotation_degrees: -heading,
        pointer_rotation_degrees: bearing,
    }
}
