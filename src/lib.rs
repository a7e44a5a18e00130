pub mod bearing;
pub mod compass;
pub mod compass_sensor;
pub mod config;
pub mod error;
pub mod heading;
pub mod location;
pub mod logging;
pub mod position;
pub mod rotation;
pub mod sensor_stream;
pub mod session;

// Re-export commonly used types
pub use bearing::{compute_bearing, qibla_bearing};
pub use config::CompassConfig;
pub use error::CompassError;
pub use heading::{MagnetometerSample, normalize_heading};
pub use position::{GeoCoordinate, KAABA};
pub use rotation::{RotationPair, compose_rotation};
pub use session::{CompassSession, CompassSessionState, CompassSnapshot};

#[cfg(test)]
pub(crate) mod mocks;
