//! Telemetry values and the blackboard they are shared through.
//!
//! The transport writes each value as a whole (one writer per cell, last
//! value wins); the control loop copies a [`TelemetrySnapshot`] out once per
//! tick and never sees a partially updated value.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::geodetic::SatelliteFix;

/// MAVLink `MAV_STATE_STANDBY`: reported on the ground, including right
/// after the flight controller detects touchdown.
pub const SYSTEM_STATUS_STANDBY: u8 = 3;
/// MAVLink `MAV_STATE_ACTIVE`.
pub const SYSTEM_STATUS_ACTIVE: u8 = 4;

// ---------------------------------------------------------------------------
// Vehicle state
// ---------------------------------------------------------------------------

/// Flight controller modes the mission cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FlightMode {
    #[default]
    Manual,
    Position,
    Offboard,
    AutoLand,
}

impl FlightMode {
    /// PX4 custom-mode string.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Position => "POSCTL",
            Self::Offboard => "OFFBOARD",
            Self::AutoLand => "AUTO.LAND",
        }
    }

    pub fn from_mode_str(s: &str) -> Option<Self> {
        match s {
            "MANUAL" => Some(Self::Manual),
            "POSCTL" => Some(Self::Position),
            "OFFBOARD" => Some(Self::Offboard),
            "AUTO.LAND" => Some(Self::AutoLand),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VehicleStatus {
    pub connected: bool,
    pub armed: bool,
    pub mode: FlightMode,
    pub system_status: u8,
}

impl Default for VehicleStatus {
    fn default() -> Self {
        Self {
            connected: false,
            armed: false,
            mode: FlightMode::Manual,
            system_status: SYSTEM_STATUS_STANDBY,
        }
    }
}

impl VehicleStatus {
    pub fn is_offboard_armed(&self) -> bool {
        self.armed && self.mode == FlightMode::Offboard
    }

    pub fn is_standby(&self) -> bool {
        self.system_status == SYSTEM_STATUS_STANDBY
    }
}

/// Local-frame position and orientation from the flight controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Odometry {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
}

impl Default for Odometry {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            orientation: UnitQuaternion::identity(),
        }
    }
}

impl Odometry {
    pub fn new(position: Vector3<f64>, yaw: f64) -> Self {
        Self {
            position,
            orientation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
        }
    }

    pub fn yaw(&self) -> f64 {
        self.orientation.euler_angles().2
    }

    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            yaw: self.yaw(),
        }
    }
}

/// Position plus heading. Setpoints and captured poses share this shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub yaw: f64,
}

impl Pose {
    pub fn new(position: Vector3<f64>, yaw: f64) -> Self {
        Self { position, yaw }
    }

    pub fn orientation(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::from_euler_angles(0.0, 0.0, self.yaw)
    }
}

/// The single command published to the vehicle each tick.
pub type Setpoint = Pose;

// ---------------------------------------------------------------------------
// Blackboard
// ---------------------------------------------------------------------------

/// Whole-value container shared between one writer and the control loop.
pub struct DataCell<T: Copy> {
    storage: Mutex<T>,
    updates: AtomicU64,
}

impl<T: Copy> DataCell<T> {
    pub const fn new(init: T) -> Self {
        Self {
            storage: Mutex::new(init),
            updates: AtomicU64::new(0),
        }
    }

    /// Replace the stored value.
    pub fn update(&self, data: T) {
        let mut slot = self.storage.lock().unwrap_or_else(|e| e.into_inner());
        *slot = data;
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy out the latest value.
    pub fn read(&self) -> T {
        *self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of updates written so far.
    pub fn update_count(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl<T: Copy + Default> Default for DataCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Everything the transport publishes.
#[derive(Default)]
pub struct TelemetryBoard {
    pub status: DataCell<VehicleStatus>,
    pub odometry: DataCell<Odometry>,
    /// `None` until the first fix; never cleared afterwards.
    pub fix: DataCell<Option<SatelliteFix>>,
}

impl TelemetryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish_fix(&self, fix: SatelliteFix) {
        self.fix.update(Some(fix));
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            status: self.status.read(),
            odometry: self.odometry.read(),
            fix: self.fix.read(),
        }
    }
}

/// What the control loop sees for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub status: VehicleStatus,
    pub odometry: Odometry,
    pub fix: Option<SatelliteFix>,
}

impl TelemetrySnapshot {
    pub fn fix_acquired(&self) -> bool {
        self.fix.is_some()
    }
}
