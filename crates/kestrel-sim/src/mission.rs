use kestrel_core::state_machine::{MissionPhase, MissionStateMachine, MissionStatus, PhaseRecord};
use kestrel_core::{MissionConfig, MissionError, Setpoint, VehicleLink};
use nalgebra::Vector3;
use serde::Serialize;
use tracing::{info, warn};

use crate::vehicle::{SimVehicle, SimVehicleConfig};

/// Per-tick record of a batch run.
#[derive(Clone, Default)]
pub struct MissionTrace {
    pub time: Vec<f64>,
    pub phase: Vec<MissionPhase>,
    pub waypoint: Vec<usize>,
    /// Odometry position the mission saw.
    pub position: Vec<Vector3<f64>>,
    pub true_position: Vec<Vector3<f64>>,
    pub yaw: Vec<f64>,
    pub setpoint: Vec<Option<Setpoint>>,
    pub holding: Vec<bool>,
}

impl MissionTrace {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HomeFrameReport {
    pub home_position: [f64; 3],
    pub home_yaw: f64,
    pub home_latitude: f64,
    pub home_longitude: f64,
    pub home_altitude: f64,
    pub frame_offset: [f64; 3],
    pub samples: u32,
}

/// Summary written next to the trace.
#[derive(Debug, Clone, Serialize)]
pub struct MissionReport {
    pub completed: bool,
    pub ticks: u64,
    pub operation_time_s: f64,
    pub final_phase: MissionPhase,
    pub waypoints_reached: usize,
    pub setpoints_published: u64,
    pub home: Option<HomeFrameReport>,
    /// Distance between the last fix (mapped through the home frame) and the
    /// last odometry position.
    pub fix_drift_m: Option<f64>,
    pub arm_odometry: Option<[f64; 3]>,
    pub phases: Vec<PhaseRecord>,
}

pub struct MissionResult {
    pub trace: MissionTrace,
    pub report: MissionReport,
}

/// Fly `config` against a simulated vehicle for at most `max_ticks`.
pub fn run_mission(
    config: &MissionConfig,
    vehicle_cfg: &SimVehicleConfig,
    max_ticks: u64,
) -> Result<MissionResult, MissionError> {
    let mut sm = MissionStateMachine::new(config.clone())?;
    let mut vehicle = SimVehicle::new(vehicle_cfg.clone())?;
    let dt = config.tick_period();

    let mut trace = MissionTrace::default();
    let mut status = MissionStatus::Running;

    for _ in 0..max_ticks {
        let seen = vehicle.telemetry();
        status = sm.tick(&mut vehicle);

        trace.time.push(vehicle.time());
        trace.phase.push(sm.phase());
        trace.waypoint.push(sm.waypoint_index());
        trace.position.push(seen.odometry.position);
        trace.true_position.push(vehicle.true_position());
        trace.yaw.push(seen.odometry.yaw());
        trace.setpoint.push(sm.last_setpoint());
        trace.holding.push(sm.is_holding());

        if status == MissionStatus::Finished {
            break;
        }
        vehicle.step(dt);
    }

    let completed = status == MissionStatus::Finished;
    if completed {
        info!(
            ticks = sm.tick_count(),
            operation_time_s = sm.operation_time(),
            "mission complete"
        );
    } else {
        warn!(
            ticks = sm.tick_count(),
            phase = sm.phase().label(),
            "mission did not finish within the tick limit"
        );
    }

    let report = build_report(&sm, &mut vehicle, completed);
    Ok(MissionResult { trace, report })
}

fn build_report(sm: &MissionStateMachine, vehicle: &mut SimVehicle, completed: bool) -> MissionReport {
    let last = vehicle.telemetry();
    let frame = sm.home_frame();

    let home = frame.map(|f| HomeFrameReport {
        home_position: xyz(&f.home_local_pose.position),
        home_yaw: f.home_local_pose.yaw,
        home_latitude: f.home_fix.latitude,
        home_longitude: f.home_fix.longitude,
        home_altitude: f.home_fix.altitude,
        frame_offset: xyz(&f.frame_offset),
        samples: f.samples,
    });
    let fix_drift_m = match (frame, last.fix) {
        (Some(f), Some(fix)) => Some((f.fix_to_local(&fix) - last.odometry.position).norm()),
        _ => None,
    };

    MissionReport {
        completed,
        ticks: sm.tick_count(),
        operation_time_s: sm.operation_time(),
        final_phase: sm.phase(),
        waypoints_reached: sm.waypoints_reached(),
        setpoints_published: vehicle.setpoints_received(),
        home,
        fix_drift_m,
        arm_odometry: vehicle.odometry_snapshots().first().map(|o| xyz(&o.position)),
        phases: sm.phase_log().to_vec(),
    }
}

fn xyz(v: &Vector3<f64>) -> [f64; 3] {
    [v.x, v.y, v.z]
}
