//! Error types for mission setup.
//!
//! Runtime command failures are not errors: they are retried on the next
//! tick. Everything here is a configuration or precondition problem that must
//! stop the mission before the vehicle leaves the ground.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MissionError {
    /// Flight cannot begin without at least one waypoint.
    #[error("waypoint list is empty")]
    NoWaypoints,

    /// A tolerance, speed, rate or duration is out of range.
    #[error("invalid parameter `{name}`: {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    /// Home frame requested before any odometry/fix pair was sampled.
    #[error("home frame calibration has no samples")]
    CalibrationIncomplete,
}

pub type Result<T> = core::result::Result<T, MissionError>;
