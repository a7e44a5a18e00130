//! Compass session state machine.
//!
//! A session walks `Idle → RequestingPermission → Locating → Ready`, computing
//! the qibla bearing once when the fix arrives and then turning each
//! magnetometer sample into a heading and a [`RotationPair`]. Failures land in
//! one of the `*Error` states; nothing is surfaced as a panic.
//!
//! Everything runs on the caller's task. `start` and `retry` suspend while the
//! permission and location providers resolve; to abandon them, drop the
//! future and call [`CompassSession::stop`]. The sampler hands its events over
//! a `watch` channel, so only the most recent sample is ever pending.

use std::fmt;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bearing::qibla_bearing;
use crate::compass::{CompassPoints, Direction, heading_to_direction};
use crate::config::CompassConfig;
use crate::error::{CompassError, ConfigError, LocationError};
use crate::heading::{HeadingFilter, normalize_heading};
use crate::location::{LocationProvider, PermissionProvider, PermissionStatus};
use crate::position::{GeoCoordinate, KAABA};
use crate::rotation::{RotationPair, compose_rotation};
use crate::sensor_stream::{MagneticFieldProvider, SensorEvent, SensorStream, SubscriptionHandle};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompassSessionState {
    Idle,
    RequestingPermission,
    Locating,
    Ready,
    PermissionError,
    LocationError,
    SensorError,
}

impl CompassSessionState {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            CompassSessionState::PermissionError
                | CompassSessionState::LocationError
                | CompassSessionState::SensorError
        )
    }

    /// States from which `retry()` re-enters `RequestingPermission`.
    pub fn can_retry(&self) -> bool {
        matches!(
            self,
            CompassSessionState::PermissionError | CompassSessionState::LocationError
        )
    }
}

impl fmt::Display for CompassSessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompassSessionState::Idle => "idle",
            CompassSessionState::RequestingPermission => "requesting permission",
            CompassSessionState::Locating => "locating",
            CompassSessionState::Ready => "ready",
            CompassSessionState::PermissionError => "permission error",
            CompassSessionState::LocationError => "location error",
            CompassSessionState::SensorError => "sensor error",
        };
        f.write_str(label)
    }
}

/// Heading derived from the latest sample, with its rendering rotations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompassReading {
    pub heading: f64,
    pub rotation: RotationPair,
}

/// Everything the rendering layer needs for one frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompassSnapshot {
    pub state: CompassSessionState,
    pub origin: Option<GeoCoordinate>,
    pub bearing: Option<f64>,
    pub heading: Option<f64>,
    pub rotation: Option<RotationPair>,
}

impl CompassSnapshot {
    /// Great-circle distance from the session origin to the Kaaba.
    pub fn distance_to_target_km(&self) -> Option<f64> {
        self.origin.map(|origin| origin.distance_to(&KAABA) / 1000.0)
    }

    pub fn heading_direction(&self, points: CompassPoints) -> Option<Direction> {
        self.heading
            .map(|heading| heading_to_direction(heading, points))
    }

    pub fn bearing_direction(&self, points: CompassPoints) -> Option<Direction> {
        self.bearing
            .map(|bearing| heading_to_direction(bearing, points))
    }
}

pub struct CompassSession<P, L, M>
where
    P: PermissionProvider,
    L: LocationProvider,
    M: MagneticFieldProvider,
{
    config: CompassConfig,
    permission: P,
    location: L,
    sensor: SensorStream<M>,
    state: CompassSessionState,
    error: Option<CompassError>,
    origin: Option<GeoCoordinate>,
    bearing: Option<f64>,
    latest: Option<CompassReading>,
    filter: Option<HeadingFilter>,
    subscription: Option<SubscriptionHandle>,
    events: Option<watch::Receiver<Option<SensorEvent>>>,
}

impl<P, L, M> CompassSession<P, L, M>
where
    P: PermissionProvider,
    L: LocationProvider,
    M: MagneticFieldProvider,
{
    pub fn new(
        config: CompassConfig,
        permission: P,
        location: L,
        magnetometer: M,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            config,
            permission,
            location,
            sensor: SensorStream::new(magnetometer),
            state: CompassSessionState::Idle,
            error: None,
            origin: None,
            bearing: None,
            latest: None,
            filter: None,
            subscription: None,
            events: None,
        })
    }

    pub fn state(&self) -> CompassSessionState {
        self.state
    }

    /// The cause behind the current `*Error` state.
    pub fn error(&self) -> Option<&CompassError> {
        self.error.as_ref()
    }

    pub fn config(&self) -> &CompassConfig {
        &self.config
    }

    pub fn snapshot(&self) -> CompassSnapshot {
        CompassSnapshot {
            state: self.state,
            origin: self.origin,
            bearing: self.bearing,
            heading: self.latest.map(|reading| reading.heading),
            rotation: self.latest.map(|reading| reading.rotation),
        }
    }

    /// Begin a session. Does nothing unless the machine is `Idle`.
    pub async fn start(&mut self) -> CompassSessionState {
        if self.state != CompassSessionState::Idle {
            debug!(state = ?self.state, "Ignoring start outside Idle");
            return self.state;
        }

        self.acquire().await;
        self.state
    }

    /// Re-enter `RequestingPermission` after a permission or location failure.
    pub async fn retry(&mut self) -> CompassSessionState {
        if !self.state.can_retry() {
            debug!(state = ?self.state, "Retry not available");
            return self.state;
        }

        self.error = None;
        self.acquire().await;
        self.state
    }

    /// Tear the session down from any state.
    ///
    /// The sensor subscription is released before this returns, so no sample
    /// is processed afterwards.
    pub fn stop(&mut self) {
        self.release_sensor();
        self.error = None;
        self.origin = None;
        self.bearing = None;
        self.latest = None;
        self.filter = None;
        self.transition(CompassSessionState::Idle);
    }

    /// Apply the newest queued sensor event, if any, without waiting.
    pub fn process_pending(&mut self) -> Option<CompassReading> {
        let event = match self.events.as_mut() {
            Some(events) if events.has_changed().unwrap_or(false) => {
                events.borrow_and_update().clone()
            }
            _ => None,
        };
        if let Some(event) = event {
            self.apply(event);
        }
        self.latest
    }

    /// Wait for the next sensor event and apply it.
    ///
    /// Returns `None` once the session is no longer `Ready`.
    pub async fn next_update(&mut self) -> Option<CompassReading> {
        if self.state != CompassSessionState::Ready {
            return None;
        }

        let event = {
            let events = self.events.as_mut()?;
            if events.changed().await.is_err() {
                return None;
            }
            events.borrow_and_update().clone()
        };
        if let Some(event) = event {
            self.apply(event);
        }

        match self.state {
            CompassSessionState::Ready => self.latest,
            _ => None,
        }
    }

    async fn acquire(&mut self) {
        self.transition(CompassSessionState::RequestingPermission);
        let status = self.permission.request_foreground_location_permission().await;
        if status == PermissionStatus::Denied {
            self.fail(CompassSessionState::PermissionError, CompassError::PermissionDenied);
            return;
        }

        self.transition(CompassSessionState::Locating);
        let timeout = self.config.location_timeout;
        let position = tokio::time::timeout(timeout, self.location.get_current_position())
            .await
            .unwrap_or(Err(LocationError::Timeout(timeout)));

        match position {
            Ok(origin) => self.enter_ready(origin),
            Err(e) => self.fail(CompassSessionState::LocationError, e.into()),
        }
    }

    fn enter_ready(&mut self, origin: GeoCoordinate) {
        let bearing = match qibla_bearing(&origin) {
            Ok(bearing) => bearing,
            Err(e) => {
                error!(%origin, error = %e, "Bearing calculation failed, falling back to 0");
                0.0
            }
        };
        info!(%origin, bearing, "Qibla bearing computed");
        self.origin = Some(origin);
        self.bearing = Some(bearing);

        let (tx, rx) = watch::channel(None);
        let started = self.sensor.start(self.config.sample_interval, move |event| {
            tx.send_replace(Some(event));
        });

        match started {
            Ok(handle) => {
                self.subscription = Some(handle);
                self.events = Some(rx);
                self.filter = self.config.smoothing.map(HeadingFilter::new);
                self.transition(CompassSessionState::Ready);
            }
            Err(e) => self.fail(CompassSessionState::SensorError, e.into()),
        }
    }

    fn apply(&mut self, event: SensorEvent) {
        if self.state != CompassSessionState::Ready {
            return;
        }

        match event {
            SensorEvent::Sample(sample) => {
                let mut heading = normalize_heading(&sample, self.config.calibration_offset_degrees);
                if let Some(filter) = self.filter.as_mut() {
                    heading = filter.apply(heading);
                }
                let rotation = compose_rotation(heading, self.bearing.unwrap_or(0.0));
                self.latest = Some(CompassReading { heading, rotation });
            }
            SensorEvent::Failed(e) => {
                self.release_sensor();
                self.latest = None;
                self.fail(CompassSessionState::SensorError, e.into());
            }
        }
    }

    fn release_sensor(&mut self) {
        if let Some(handle) = self.subscription.take() {
            self.sensor.stop(&handle);
        }
        self.sensor.release();
        self.events = None;
    }

    fn fail(&mut self, state: CompassSessionState, cause: CompassError) {
        warn!(state = %state, error = %cause, "Compass session failed");
        self.error = Some(cause);
        self.transition(state);
    }

    fn transition(&mut self, next: CompassSessionState) {
        debug!(from = %self.state, to = %next, "Compass state transition");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::SensorError;
    use crate::heading::MagnetometerSample;
    use crate::mocks::mock_location::{ScriptedLocation, ScriptedPermission};
    use crate::mocks::mock_sensor::{MockMagnetometer, ProviderCounters};

    type TestSession = CompassSession<ScriptedPermission, ScriptedLocation, MockMagnetometer>;

    fn config() -> CompassConfig {
        CompassConfig::default().with_calibration_offset(0.0)
    }

    fn north_facing() -> MockMagnetometer {
        MockMagnetometer::repeating(MagnetometerSample::new(1.0, 0.0, 0.0))
    }

    fn session(
        permission: ScriptedPermission,
        location: ScriptedLocation,
        magnetometer: MockMagnetometer,
    ) -> (TestSession, ProviderCounters) {
        let counters = magnetometer.counters();
        let session = CompassSession::new(config(), permission, location, magnetometer).unwrap();
        (session, counters)
    }

    #[tokio::test(start_paused = true)]
    async fn test_happy_path_reaches_ready() {
        let (mut session, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());
        assert_eq!(session.state(), CompassSessionState::Idle);

        assert_eq!(session.start().await, CompassSessionState::Ready);
        let bearing = session.snapshot().bearing.unwrap();
        assert!((bearing - 61.1).abs() < 0.5, "bearing {bearing}");

        let reading = session.next_update().await.unwrap();
        assert_eq!(reading.heading, 0.0);
        assert_eq!(reading.rotation.dial_rotation_degrees, 0.0);
        assert_eq!(reading.rotation.pointer_rotation_degrees, bearing);
        assert_eq!(counters.subscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_calibration_offset_from_config_is_applied() {
        let magnetometer = north_facing();
        let config = CompassConfig::default();
        let mut session = CompassSession::new(
            config,
            ScriptedPermission::granted(),
            ScriptedLocation::at(0.0, 0.0),
            magnetometer,
        )
        .unwrap();

        session.start().await;
        let reading = session.next_update().await.unwrap();
        assert_eq!(reading.heading, 90.0);
        assert_eq!(reading.rotation.dial_rotation_degrees, -90.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_pending_applies_latest_sample() {
        let (mut session, _) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());
        session.start().await;
        assert!(session.process_pending().is_none());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let reading = session.process_pending().unwrap();
        assert_eq!(reading.heading, 0.0);
        assert_eq!(session.snapshot().heading, Some(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_then_retry() {
        let permission = ScriptedPermission::new([PermissionStatus::Denied, PermissionStatus::Granted]);
        let (mut session, _) = session(permission, ScriptedLocation::at(21.0, 39.0), north_facing());

        assert_eq!(session.start().await, CompassSessionState::PermissionError);
        assert!(matches!(session.error(), Some(CompassError::PermissionDenied)));
        assert!(session.error().unwrap().is_retryable());

        assert_eq!(session.retry().await, CompassSessionState::Ready);
        assert!(session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_failure_then_retry() {
        let location = ScriptedLocation::new([
            Err(LocationError::NoFix),
            Ok(GeoCoordinate::new(51.5074, -0.1278)),
        ]);
        let (mut session, _) = session(ScriptedPermission::granted(), location, north_facing());

        assert_eq!(session.start().await, CompassSessionState::LocationError);
        assert!(matches!(
            session.error(),
            Some(CompassError::LocationUnavailable(LocationError::NoFix))
        ));

        assert_eq!(session.retry().await, CompassSessionState::Ready);
        let bearing = session.snapshot().bearing.unwrap();
        assert!((bearing - 119.0).abs() < 0.5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_location_timeout() {
        let (mut session, _) =
            session(ScriptedPermission::granted(), ScriptedLocation::hanging(), north_facing());

        assert_eq!(session.start().await, CompassSessionState::LocationError);
        assert!(matches!(
            session.error(),
            Some(CompassError::LocationUnavailable(LocationError::Timeout(_)))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_unavailable_is_permanent() {
        let (mut session, counters) = session(
            ScriptedPermission::granted(),
            ScriptedLocation::at(21.0, 39.0),
            MockMagnetometer::unavailable(),
        );

        assert_eq!(session.start().await, CompassSessionState::SensorError);
        assert!(matches!(
            session.error(),
            Some(CompassError::SensorUnavailable(SensorError::Unavailable(_)))
        ));
        assert!(!session.error().unwrap().is_retryable());

        assert_eq!(session.retry().await, CompassSessionState::SensorError);
        assert_eq!(session.start().await, CompassSessionState::SensorError);

        session.stop();
        assert_eq!(session.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_failure_while_ready() {
        let magnetometer = MockMagnetometer::failing_after(1, MagnetometerSample::new(0.0, 1.0, 0.0));
        let (mut session, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), magnetometer);

        session.start().await;
        assert_eq!(session.next_update().await.map(|r| r.heading), Some(90.0));
        assert_eq!(session.next_update().await, None);

        assert_eq!(session.state(), CompassSessionState::SensorError);
        assert_eq!(session.snapshot().heading, None);
        assert_eq!(counters.unsubscribes(), 1);

        session.stop();
        assert_eq!(counters.unsubscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_fix_falls_back_to_zero_bearing() {
        let (mut session, _) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(123.0, 0.0), north_facing());

        assert_eq!(session.start().await, CompassSessionState::Ready);
        assert_eq!(session.snapshot().bearing, Some(0.0));
        assert!(session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_outside_idle_is_ignored() {
        let (mut session, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());

        session.start().await;
        assert_eq!(session.start().await, CompassSessionState::Ready);
        assert_eq!(counters.subscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_from_every_state_returns_to_idle() {
        let short = Duration::from_millis(10);

        // Idle
        let (mut idle, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());
        idle.stop();
        assert_eq!(idle.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 0);

        // RequestingPermission
        let (mut requesting, counters) =
            session(ScriptedPermission::hanging(), ScriptedLocation::at(21.0, 39.0), north_facing());
        assert!(tokio::time::timeout(short, requesting.start()).await.is_err());
        assert_eq!(requesting.state(), CompassSessionState::RequestingPermission);
        requesting.stop();
        assert_eq!(requesting.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 0);

        // Locating
        let (mut locating, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::hanging(), north_facing());
        assert!(tokio::time::timeout(short, locating.start()).await.is_err());
        assert_eq!(locating.state(), CompassSessionState::Locating);
        locating.stop();
        assert_eq!(locating.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 0);

        // Ready
        let (mut ready, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());
        ready.start().await;
        ready.stop();
        ready.stop();
        assert_eq!(ready.state(), CompassSessionState::Idle);
        assert_eq!(ready.snapshot().bearing, None);
        assert_eq!(counters.unsubscribes(), 1);

        // PermissionError
        let (mut denied, counters) = session(
            ScriptedPermission::new([PermissionStatus::Denied]),
            ScriptedLocation::at(21.0, 39.0),
            north_facing(),
        );
        denied.start().await;
        denied.stop();
        assert_eq!(denied.state(), CompassSessionState::Idle);
        assert!(denied.error().is_none());
        assert_eq!(counters.unsubscribes(), 0);

        // LocationError
        let (mut lost, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::new([]), north_facing());
        lost.start().await;
        assert_eq!(lost.state(), CompassSessionState::LocationError);
        lost.stop();
        assert_eq!(lost.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 0);

        // SensorError
        let (mut broken, counters) = session(
            ScriptedPermission::granted(),
            ScriptedLocation::at(21.0, 39.0),
            MockMagnetometer::failing_after(0, MagnetometerSample::new(1.0, 0.0, 0.0)),
        );
        broken.start().await;
        assert_eq!(broken.next_update().await, None);
        assert_eq!(broken.state(), CompassSessionState::SensorError);
        broken.stop();
        assert_eq!(broken.state(), CompassSessionState::Idle);
        assert_eq!(counters.unsubscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_is_reentrant_after_stop() {
        let location = ScriptedLocation::new([
            Ok(GeoCoordinate::new(21.0, 39.0)),
            Ok(GeoCoordinate::new(35.6762, 139.6503)),
        ]);
        let (mut session, counters) = session(ScriptedPermission::granted(), location, north_facing());

        session.start().await;
        session.stop();
        assert_eq!(session.start().await, CompassSessionState::Ready);

        let bearing = session.snapshot().bearing.unwrap();
        assert!((bearing - 293.0).abs() < 0.5);
        assert_eq!(counters.subscribes(), 2);
        assert_eq!(counters.unsubscribes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_processed_after_stop() {
        let (mut session, counters) =
            session(ScriptedPermission::granted(), ScriptedLocation::at(21.0, 39.0), north_facing());
        session.start().await;
        session.next_update().await;
        session.stop();

        let reads = counters.reads();
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(counters.reads(), reads);
        assert_eq!(session.process_pending(), None);
        assert_eq!(session.next_update().await, None);
    }

    #[test]
    fn test_snapshot_labels() {
        let snapshot = CompassSnapshot {
            state: CompassSessionState::Ready,
            origin: Some(GeoCoordinate::new(35.6762, 139.6503)),
            bearing: Some(293.0),
            heading: Some(0.0),
            rotation: Some(compose_rotation(0.0, 293.0)),
        };
        assert_eq!(snapshot.bearing_direction(CompassPoints::Sixteen), Some(Direction::WNW));
        assert_eq!(snapshot.heading_direction(CompassPoints::Sixteen), Some(Direction::N));
        assert_eq!(snapshot.bearing_direction(CompassPoints::Eight), Some(Direction::NW));
        assert_eq!(snapshot.bearing_direction(CompassPoints::Four), Some(Direction::W));
        let km = snapshot.distance_to_target_km().unwrap();
        assert!(km > 9000.0 && km < 10000.0, "got {km} km");
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CompassConfig::default().with_sample_interval(Duration::ZERO);
        let result = CompassSession::new(
            config,
            ScriptedPermission::granted(),
            ScriptedLocation::at(0.0, 0.0),
            north_facing(),
        );
        assert!(matches!(result, Err(ConfigError::ZeroInterval)));
    }
}
