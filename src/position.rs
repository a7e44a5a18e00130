use std::fmt;

use crate::error::CalculationError;

/// Earth's radius in meters.
const EARTH_RADIUS: f64 = 6371000.0;

/// The Kaaba in Mecca, the fixed reference point every bearing is computed toward.
pub const KAABA: GeoCoordinate = GeoCoordinate {
    latitude: 21.4225,
    longitude: 39.8262,
};

/// A point on the Earth's surface in decimal degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl fmt::Display for GeoCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}°, {:.6}°)", self.latitude, self.longitude)
    }
}

impl GeoCoordinate {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Build a coordinate, rejecting values outside [-90,90] / [-180,180].
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self, CalculationError> {
        let coordinate = Self::new(latitude, longitude);
        coordinate.validate()?;
        Ok(coordinate)
    }

    /// Values outside the valid range are an error, never clamped.
    pub fn validate(&self) -> Result<(), CalculationError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(CalculationError::NonFinite);
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(CalculationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(CalculationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Calculate distance to another position using Haversine formula.
    /// Read more here: https://en.wikipedia.org/wiki/Haversine_formula
    /// Returns the distance in meters.
    pub fn distance_to(&self, other: &GeoCoordinate) -> f64 {
        let lat_from = self.latitude.to_radians();
        let lat_to = other.latitude.to_radians();
        let delta_lat = (other.latitude - self.latitude).to_radians();
        let delta_lon = (other.longitude - self.longitude).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat_from.cos() * lat_to.cos() * (delta_lon / 2.0).sin().powi(2);

        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }
}
