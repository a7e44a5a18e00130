// This file is only compiled during tests

use std::collections::VecDeque;

use crate::error::LocationError;
use crate::location::{LocationProvider, PermissionProvider, PermissionStatus};
use crate::position::GeoCoordinate;

/// Answers permission requests from a script; repeats the last answer.
pub struct ScriptedPermission {
    answers: VecDeque<PermissionStatus>,
    last: PermissionStatus,
    hang: bool,
}

impl ScriptedPermission {
    pub fn new(answers: impl IntoIterator<Item = PermissionStatus>) -> Self {
        Self {
            answers: answers.into_iter().collect(),
            last: PermissionStatus::Granted,
            hang: false,
        }
    }

    pub fn granted() -> Self {
        Self::new([PermissionStatus::Granted])
    }

    /// Never answers, leaving the session in `RequestingPermission`.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::granted()
        }
    }
}

impl PermissionProvider for ScriptedPermission {
    async fn request_foreground_location_permission(&mut self) -> PermissionStatus {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(answer) = self.answers.pop_front() {
            self.last = answer;
        }
        self.last
    }
}

/// Returns scripted fixes in order, then `NoFix`. A hanging provider never
/// resolves.
pub struct ScriptedLocation {
    responses: VecDeque<Result<GeoCoordinate, LocationError>>,
    hang: bool,
}

impl ScriptedLocation {
    pub fn new(responses: impl IntoIterator<Item = Result<GeoCoordinate, LocationError>>) -> Self {
        Self {
            responses: responses.into_iter().collect(),
            hang: false,
        }
    }

    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self::new([Ok(GeoCoordinate::new(latitude, longitude))])
    }

    pub fn hanging() -> Self {
        Self {
            responses: VecDeque::new(),
            hang: true,
        }
    }
}

impl LocationProvider for ScriptedLocation {
    async fn get_current_position(&mut self) -> Result<GeoCoordinate, LocationError> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.responses.pop_front().unwrap_or(Err(LocationError::NoFix))
    }
}
