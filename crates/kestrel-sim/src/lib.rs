//! Kestrel Simulation Library
//!
//! Kinematic vehicle stand-in and batch mission runner.

pub mod mission;
pub mod params;
pub mod vehicle;

// Re-export main types
pub use mission::{run_mission, HomeFrameReport, MissionReport, MissionResult, MissionTrace};
pub use params::*;
pub use vehicle::{SimVehicle, SimVehicleConfig};
