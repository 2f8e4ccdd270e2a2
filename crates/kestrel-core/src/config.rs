// ---------------------------------------------------------------------------
// Mission configuration
// ---------------------------------------------------------------------------

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::calibration::OffsetReference;
use crate::error::{MissionError, Result};

/// A local-frame target (m).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Waypoint {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }
}

/// Everything the mission reads once at start. Durations are seconds and are
/// converted to ticks with `tick_rate_hz`; speeds are meters per tick of
/// setpoint lead, `yaw_rate` is radians per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MissionConfig {
    pub waypoints: Vec<Waypoint>,

    pub target_tolerance: f64,
    pub landing_tolerance: f64,

    pub cruise_speed: f64,
    pub deceleration_speed: f64,
    pub landing_speed: f64,
    pub return_speed: f64,
    pub yaw_rate: f64,

    pub takeoff_altitude: f64,
    pub delivery_altitude: f64,

    pub takeoff_hover_time: f64,
    pub hover_time: f64,
    pub unpack_time: f64,

    /// Arm and switch to offboard from the mission itself (SITL). When off,
    /// an operator arms and switches mode from the RC transmitter.
    pub simulation_mode: bool,
    pub delivery_enabled: bool,
    pub return_home_enabled: bool,

    pub tick_rate_hz: f64,
    pub calibration_samples: u32,
    pub stream_init_ticks: u32,
    pub offset_reference: OffsetReference,
    /// Publish the odometry once at arming so drift can be compared offline.
    pub publish_arm_odometry: bool,
}

impl Default for MissionConfig {
    fn default() -> Self {
        Self {
            waypoints: vec![Waypoint::new(10.0, 0.0, 5.0), Waypoint::new(10.0, 10.0, 5.0)],
            target_tolerance: 0.5,
            landing_tolerance: 0.3,
            cruise_speed: 1.0,
            deceleration_speed: 0.3,
            landing_speed: 0.5,
            return_speed: 1.0,
            yaw_rate: 0.1,
            takeoff_altitude: 5.0,
            delivery_altitude: 1.5,
            takeoff_hover_time: 2.0,
            hover_time: 2.0,
            unpack_time: 3.0,
            simulation_mode: true,
            delivery_enabled: false,
            return_home_enabled: false,
            tick_rate_hz: 10.0,
            calibration_samples: 100,
            stream_init_ticks: 50,
            offset_reference: OffsetReference::PerSample,
            publish_arm_odometry: false,
        }
    }
}

impl MissionConfig {
    /// Reject anything that would stall or misbehave mid-flight.
    pub fn validate(&self) -> Result<()> {
        if self.waypoints.is_empty() {
            return Err(MissionError::NoWaypoints);
        }

        let positive = [
            ("target_tolerance", self.target_tolerance),
            ("landing_tolerance", self.landing_tolerance),
            ("cruise_speed", self.cruise_speed),
            ("deceleration_speed", self.deceleration_speed),
            ("landing_speed", self.landing_speed),
            ("return_speed", self.return_speed),
            ("yaw_rate", self.yaw_rate),
            ("tick_rate_hz", self.tick_rate_hz),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(MissionError::InvalidParameter {
                    name,
                    value,
                    reason: "must be positive",
                });
            }
        }

        let durations = [
            ("takeoff_hover_time", self.takeoff_hover_time),
            ("hover_time", self.hover_time),
            ("unpack_time", self.unpack_time),
        ];
        for (name, value) in durations {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MissionError::InvalidParameter {
                    name,
                    value,
                    reason: "must be non-negative",
                });
            }
        }

        if self.calibration_samples == 0 {
            return Err(MissionError::InvalidParameter {
                name: "calibration_samples",
                value: 0.0,
                reason: "must sample at least once",
            });
        }

        for w in &self.waypoints {
            if !(w.x.is_finite() && w.y.is_finite() && w.z.is_finite()) {
                return Err(MissionError::InvalidParameter {
                    name: "waypoints",
                    value: f64::NAN,
                    reason: "coordinates must be finite",
                });
            }
        }

        Ok(())
    }

    pub fn tick_period(&self) -> f64 {
        1.0 / self.tick_rate_hz
    }

    /// Whole ticks covering `seconds`, at least one.
    pub fn ticks_for(&self, seconds: f64) -> u32 {
        ((seconds * self.tick_rate_hz).ceil() as u32).max(1)
    }
}
