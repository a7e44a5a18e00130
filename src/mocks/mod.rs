// This module is only compiled during tests

pub mod mock_location;
pub mod mock_sensor;
