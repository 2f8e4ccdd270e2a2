//! Real-time mission runner.
//!
//! The simulated vehicle steps its physics in a spawned task and publishes
//! into a shared [`TelemetryBoard`]. The control loop reads that board on its
//! own interval, the same way it would read telemetry callbacks from a real
//! autopilot link.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use kestrel_core::{
    FlightMode, MissionStateMachine, MissionStatus, Odometry, Setpoint, TelemetryBoard,
    TelemetrySnapshot, VehicleLink,
};
use kestrel_sim::{SimVehicle, SimVehicleConfig};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Seconds the simulated operator waits after the setpoint warm-up ends.
const OPERATOR_ARM_MARGIN: f64 = 3.0;

pub struct LiveOptions {
    pub mission: Option<PathBuf>,
    pub speed: f64,
    pub physics_ratio: u32,
    pub timeout: f64,
    pub seed: u64,
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            mission: None,
            speed: 1.0,
            physics_ratio: 5,
            timeout: 600.0,
            seed: 42,
        }
    }
}

/// Controller side of the shared vehicle: telemetry comes off the board,
/// commands go straight to the vehicle.
struct LiveLink {
    board: Arc<TelemetryBoard>,
    vehicle: Arc<Mutex<SimVehicle>>,
}

impl LiveLink {
    fn vehicle(&self) -> MutexGuard<'_, SimVehicle> {
        self.vehicle.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl VehicleLink for LiveLink {
    fn telemetry(&mut self) -> TelemetrySnapshot {
        self.board.snapshot()
    }

    fn publish_setpoint(&mut self, setpoint: &Setpoint) {
        self.vehicle().publish_setpoint(setpoint);
    }

    fn arm(&mut self, arm: bool) -> bool {
        self.vehicle().arm(arm)
    }

    fn set_mode(&mut self, mode: FlightMode) -> bool {
        self.vehicle().set_mode(mode)
    }

    fn publish_odometry_snapshot(&mut self, odometry: &Odometry) {
        self.vehicle().publish_odometry_snapshot(odometry);
    }
}

pub fn run_live(opts: LiveOptions) -> Result<()> {
    if !(opts.speed.is_finite() && opts.speed > 0.0) {
        bail!("speed must be positive, got {}", opts.speed);
    }
    if opts.physics_ratio == 0 {
        bail!("physics ratio must be at least 1");
    }

    let config = kestrel_cli::load_mission(opts.mission.as_deref())?;
    let mut sm =
        MissionStateMachine::new(config.clone()).context("invalid mission configuration")?;

    let mut vehicle_cfg = SimVehicleConfig {
        seed: opts.seed,
        ..Default::default()
    };
    if !config.simulation_mode {
        // Stand in for the operator flipping the switches.
        vehicle_cfg.operator_arm_delay = Some(
            f64::from(config.stream_init_ticks) * config.tick_period() + OPERATOR_ARM_MARGIN,
        );
    }

    let board = Arc::new(TelemetryBoard::new());
    let vehicle = Arc::new(Mutex::new(SimVehicle::with_board(
        vehicle_cfg,
        Arc::clone(&board),
    )?));

    let control_dt = config.tick_period();
    let physics_dt = control_dt / f64::from(opts.physics_ratio);
    let max_ticks = (opts.timeout / control_dt).ceil() as u64;

    info!(
        waypoints = config.waypoints.len(),
        tick_rate_hz = config.tick_rate_hz,
        speed = opts.speed,
        "starting live mission"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let status = rt.block_on(async {
        let physics = {
            let vehicle = Arc::clone(&vehicle);
            let period = Duration::from_secs_f64(physics_dt / opts.speed);
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);
                loop {
                    ticker.tick().await;
                    vehicle
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .step(physics_dt);
                }
            })
        };

        let mut link = LiveLink {
            board: Arc::clone(&board),
            vehicle: Arc::clone(&vehicle),
        };
        let mut ticker = interval(Duration::from_secs_f64(control_dt / opts.speed));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut status = MissionStatus::Running;
        let mut last_phase = sm.phase();
        for _ in 0..max_ticks {
            ticker.tick().await;
            status = sm.tick(&mut link);
            if sm.phase() != last_phase {
                last_phase = sm.phase();
                let position = board.odometry.read().position;
                println!(
                    "[{:>7.2}s] {:<20} ({:>7.2}, {:>7.2}, {:>6.2})",
                    link.vehicle().time(),
                    last_phase.label(),
                    position.x,
                    position.y,
                    position.z
                );
            }
            if status == MissionStatus::Finished {
                break;
            }
        }

        physics.abort();
        status
    });

    if status != MissionStatus::Finished {
        warn!(phase = sm.phase().label(), "live mission timed out");
        bail!(
            "mission did not finish within {:.0} s (stuck in {})",
            opts.timeout,
            sm.phase().label()
        );
    }

    println!("\nMission complete");
    println!("  Waypoints reached:  {}", sm.waypoints_reached());
    println!("  Control ticks:      {}", sm.tick_count());
    println!("  Operation time:     {:.1} s", sm.operation_time());
    if let Some(home) = sm.home_frame() {
        println!(
            "  Frame offset:       ({:.2}, {:.2}, {:.2}) m",
            home.frame_offset.x, home.frame_offset.y, home.frame_offset.z
        );
    }
    Ok(())
}
