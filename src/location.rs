//! Location permission and one-shot position providers.
//!
//! On the Pi, "location permission" means read access to the GPS serial
//! device, and the position comes from the NMEA sentences it emits. Manual
//! setups without a receiver use [`StaticPermission`] and [`FixedLocation`].

use std::fs::File;
use std::future::Future;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use nmea::Nmea;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::LocationError;
use crate::position::GeoCoordinate;

/// Give up on a receiver that has produced this many sentences without a fix.
pub const DEFAULT_MAX_SENTENCES: usize = 600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PermissionStatus {
    Granted,
    Denied,
}

pub trait PermissionProvider {
    fn request_foreground_location_permission(
        &mut self,
    ) -> impl Future<Output = PermissionStatus> + Send;
}

/// Single-shot position source, not a stream.
pub trait LocationProvider {
    fn get_current_position(
        &mut self,
    ) -> impl Future<Output = Result<GeoCoordinate, LocationError>> + Send;
}

/// Always answers with the same status.
#[derive(Clone, Copy, Debug)]
pub struct StaticPermission(pub PermissionStatus);

impl PermissionProvider for StaticPermission {
    async fn request_foreground_location_permission(&mut self) -> PermissionStatus {
        self.0
    }
}

/// Grants permission when the GPS device node can be opened for reading.
///
/// Only an explicit permission error counts as a denial. A missing device is
/// granted and left for the location fetch to report.
#[derive(Clone, Debug)]
pub struct DevicePermission {
    device: PathBuf,
}

impl DevicePermission {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
        }
    }
}

impl PermissionProvider for DevicePermission {
    async fn request_foreground_location_permission(&mut self) -> PermissionStatus {
        match tokio::fs::File::open(&self.device).await {
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                info!(device = %self.device.display(), "No read access to GPS device");
                PermissionStatus::Denied
            }
            _ => PermissionStatus::Granted,
        }
    }
}

/// A position entered by hand.
#[derive(Clone, Copy, Debug)]
pub struct FixedLocation(pub GeoCoordinate);

impl LocationProvider for FixedLocation {
    async fn get_current_position(&mut self) -> Result<GeoCoordinate, LocationError> {
        Ok(self.0)
    }
}

/// Reads NMEA sentences from a serial GPS until a position fix appears.
#[derive(Clone, Debug)]
pub struct NmeaLocationProvider {
    device: PathBuf,
    max_sentences: usize,
}

impl NmeaLocationProvider {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            max_sentences: DEFAULT_MAX_SENTENCES,
        }
    }

    pub fn with_max_sentences(mut self, max_sentences: usize) -> Self {
        self.max_sentences = max_sentences;
        self
    }
}

impl LocationProvider for NmeaLocationProvider {
    async fn get_current_position(&mut self) -> Result<GeoCoordinate, LocationError> {
        let device = self.device.clone();
        let max_sentences = self.max_sentences;

        // Dropping this future (timeout, session stop) cancels the reader.
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        info!(device = %device.display(), "Waiting for GPS fix");
        tokio::task::spawn_blocking(move || {
            let file = File::open(&device)?;
            read_fix(BufReader::new(file), max_sentences, &cancel)
        })
        .await
        .map_err(|e| LocationError::Io(io::Error::other(format!("GPS reader task failed: {e}"))))?
    }
}

/// Parse sentences from `reader` until one yields latitude and longitude.
///
/// Unparsable sentences and undecodable lines are skipped. Running out of
/// input, or reading `max_sentences` lines without a fix, is [`LocationError::NoFix`].
/// `cancel` is checked before every line; a blocked read is only noticed once
/// the next line arrives.
pub fn read_fix<R: BufRead>(
    reader: R,
    max_sentences: usize,
    cancel: &CancellationToken,
) -> Result<GeoCoordinate, LocationError> {
    let mut nmea = Nmea::default();

    for line in reader.lines().take(max_sentences) {
        if cancel.is_cancelled() {
            debug!("GPS fix abandoned");
            return Err(LocationError::Cancelled);
        }

        let content = match line {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                debug!(error = %e, "Skipping undecodable GPS line");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let trimmed = content.trim();
        if trimmed.is_empty() {
            continue;
        }

        match nmea.parse(trimmed) {
            Ok(_) => {
                if let (Some(lat), Some(lon)) = (nmea.latitude, nmea.longitude) {
                    let position = GeoCoordinate::checked(lat, lon)?;
                    info!(%position, satellites = ?nmea.num_of_fix_satellites, "GPS fix acquired");
                    return Ok(position);
                }
            }
            Err(e) => debug!(sentence = trimmed, error = ?e, "Skipping NMEA sentence"),
        }
    }

    Err(LocationError::NoFix)
}
