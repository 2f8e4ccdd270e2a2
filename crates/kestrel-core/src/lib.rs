//! # Kestrel Core
//!
//! Mission logic for an autonomous multi-waypoint offboard flight:
//! - WGS84 geodetic to local tangent-plane conversion
//! - Home frame calibration (odometry vs. satellite offset)
//! - Velocity and rate-limited heading control
//! - Telemetry blackboard and the vehicle link trait
//! - Mission state machine
//!
//! Nothing here blocks or talks to hardware; a [`VehicleLink`] supplies
//! telemetry and carries commands.

pub mod calibration;
pub mod config;
pub mod error;
pub mod geodetic;
pub mod link;
pub mod motion;
pub mod state_machine;
pub mod telemetry;

// Re-export core types
pub use calibration::{HomeFrame, HomeFrameCalibrator, OffsetReference};
pub use config::{MissionConfig, Waypoint};
pub use error::MissionError;
pub use geodetic::SatelliteFix;
pub use link::VehicleLink;
pub use state_machine::{MissionPhase, MissionStateMachine, MissionStatus, PhaseRecord};
pub use telemetry::{
    DataCell, FlightMode, Odometry, Pose, Setpoint, TelemetryBoard, TelemetrySnapshot,
    VehicleStatus,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
