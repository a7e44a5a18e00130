use std::time::Duration;

use crate::error::ConfigError;

// ** CALIBRATION CONFIGURATION ** //

/// Correction between the sensor's X axis and the device's visual "up" in
/// portrait orientation. Chosen empirically; landscape or upside-down mounts
/// need their own value.
pub const DEFAULT_CALIBRATION_OFFSET_DEGREES: f64 = -90.0;

// ** SENSOR CONFIGURATION ** //

/// Magnetometer sampling period.
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 100;
/// I2C address of the LIS3MDL (SDO/SA1 pulled low).
pub const LIS3MDL_ADDR: u16 = 0x1C;

// ** LOCATION CONFIGURATION ** //

pub const DEFAULT_GPS_DEVICE: &str = "/dev/serial0";
/// How long the one-shot fix may take before the session gives up.
pub const DEFAULT_LOCATION_TIMEOUT_SECS: u64 = 30;

// ** DISPLAY CONFIGURATION ** //
pub const DEFAULT_STATUS_INTERVAL_SECS: u64 = 1;

/// Per-session settings, passed in explicitly when the session is created.
#[derive(Clone, Debug, PartialEq)]
pub struct CompassConfig {
    pub calibration_offset_degrees: f64,
    pub sample_interval: Duration,
    /// EMA factor for heading smoothing. `None` keeps raw headings.
    pub smoothing: Option<f64>,
    pub location_timeout: Duration,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            calibration_offset_degrees: DEFAULT_CALIBRATION_OFFSET_DEGREES,
            sample_interval: Duration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS),
            smoothing: None,
            location_timeout: Duration::from_secs(DEFAULT_LOCATION_TIMEOUT_SECS),
        }
    }
}

impl CompassConfig {
    pub fn with_calibration_offset(mut self, degrees: f64) -> Self {
        self.calibration_offset_degrees = degrees;
        self
    }

    pub fn with_sample_interval(mut self, interval: Duration) -> Self {
        self.sample_interval = interval;
        self
    }

    pub fn with_smoothing(mut self, alpha: Option<f64>) -> Self {
        self.smoothing = alpha;
        self
    }

    pub fn with_location_timeout(mut self, timeout: Duration) -> Self {
        self.location_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if !self.calibration_offset_degrees.is_finite() {
            return Err(ConfigError::NonFiniteOffset);
        }
        if let Some(alpha) = self.smoothing
            && !(alpha > 0.0 && alpha <= 1.0)
        {
            return Err(ConfigError::SmoothingOutOfRange(alpha));
        }
        Ok(())
    }
}
