//! Initial great-circle bearing from an origin toward a target.

use crate::compass::normalize_degrees;
use crate::error::CalculationError;
use crate::position::{GeoCoordinate, KAABA};

/// Origins closer than this (in degrees on both axes) to the target are
/// treated as coincident.
const COINCIDENT_EPSILON_DEGREES: f64 = 1e-9;

/// Calculate the initial bearing from `origin` to `target`.
/// Returns degrees in [0, 360), where 0 is true north.
///
/// Both coordinates are range checked first; coincident points yield 0.
pub fn compute_bearing(
    origin: &GeoCoordinate,
    target: &GeoCoordinate,
) -> Result<f64, CalculationError> {
    origin.validate()?;
    target.validate()?;

    if (origin.latitude - target.latitude).abs() < COINCIDENT_EPSILON_DEGREES
        && (origin.longitude - target.longitude).abs() < COINCIDENT_EPSILON_DEGREES
    {
        return Ok(0.0);
    }

    let lat_from = origin.latitude.to_radians();
    let lat_to = target.latitude.to_radians();
    let delta_lon = (target.longitude - origin.longitude).to_radians();

    let y = delta_lon.sin() * lat_to.cos();
    let x = lat_from.cos() * lat_to.sin() - lat_from.sin() * lat_to.cos() * delta_lon.cos();

    Ok(normalize_degrees(y.atan2(x).to_degrees()))
}

/// Bearing from `origin` toward the Kaaba.
pub fn qibla_bearing(origin: &GeoCoordinate) -> Result<f64, CalculationError> {
    compute_bearing(origin, &KAABA)
}
