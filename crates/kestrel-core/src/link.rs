//! Boundary between the mission and whatever carries its commands.

use crate::telemetry::{FlightMode, Odometry, Setpoint, TelemetrySnapshot};

/// Telemetry in, commands out.
///
/// Requests return immediately with the flight controller's acceptance; a
/// `false` is retried by the caller on the next tick.
pub trait VehicleLink {
    fn telemetry(&mut self) -> TelemetrySnapshot;

    fn publish_setpoint(&mut self, setpoint: &Setpoint);

    fn arm(&mut self, arm: bool) -> bool;

    fn set_mode(&mut self, mode: FlightMode) -> bool;

    /// One-off odometry publication for offline drift comparison.
    fn publish_odometry_snapshot(&mut self, _odometry: &Odometry) {}
}

impl<L: VehicleLink + ?Sized> VehicleLink for &mut L {
    fn telemetry(&mut self) -> TelemetrySnapshot {
        (**self).telemetry()
    }

    fn publish_setpoint(&mut self, setpoint: &Setpoint) {
        (**self).publish_setpoint(setpoint)
    }

    fn arm(&mut self, arm: bool) -> bool {
        (**self).arm(arm)
    }

    fn set_mode(&mut self, mode: FlightMode) -> bool {
        (**self).set_mode(mode)
    }

    fn publish_odometry_snapshot(&mut self, odometry: &Odometry) {
        (**self).publish_odometry_snapshot(odometry)
    }
}
