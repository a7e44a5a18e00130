//! Error types for the compass core.
//!
//! Every failure a session can meet is folded into [`CompassError`] and then
//! into a [`CompassSessionState`](crate::session::CompassSessionState); nothing
//! escapes to the rendering layer as a panic.

use std::io;

use thiserror::Error;

/// Invalid input to the bearing calculator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CalculationError {
    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("coordinate is not a finite number")]
    NonFinite,
}

/// Failures from the magnetic field provider.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// The device has no usable magnetometer, or it could not be brought up.
    #[error("magnetometer unavailable: {0}")]
    Unavailable(String),

    /// A sample could not be read while streaming.
    #[error("magnetometer read failed: {0}")]
    ReadFailed(String),
}

/// Failures from the one-shot location fetch.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location source I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("no position fix in the location source")]
    NoFix,

    #[error("timed out after {0:?} waiting for a position fix")]
    Timeout(std::time::Duration),

    #[error("position fetch was cancelled")]
    Cancelled,

    #[error("location source reported an invalid coordinate: {0}")]
    InvalidCoordinate(#[from] CalculationError),
}

/// Invalid session configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample interval must be greater than zero")]
    ZeroInterval,

    #[error("calibration offset must be a finite number of degrees")]
    NonFiniteOffset,

    #[error("smoothing factor {0} is outside (0, 1]")]
    SmoothingOutOfRange(f64),
}

/// Session-level error taxonomy exposed next to the `*Error` states.
#[derive(Debug, Error)]
pub enum CompassError {
    /// The user declined location access.
    #[error("location permission was denied")]
    PermissionDenied,

    /// The location provider could not resolve a fix.
    #[error("current location is unavailable: {0}")]
    LocationUnavailable(#[from] LocationError),

    /// The platform lacks the required sensor. Permanent for the session.
    #[error("compass sensor is unavailable: {0}")]
    SensorUnavailable(#[from] SensorError),

    /// Bad coordinate handed to the bearing calculator. Internal defect.
    #[error("bearing calculation failed: {0}")]
    Calculation(#[from] CalculationError),
}

impl CompassError {
    /// Whether the user can be offered a retry for this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CompassError::PermissionDenied | CompassError::LocationUnavailable(_)
        )
    }
}
