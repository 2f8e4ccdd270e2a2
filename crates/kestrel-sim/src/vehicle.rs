use std::sync::Arc;

use kestrel_core::geodetic::{self, SatelliteFix};
use kestrel_core::motion::wrap_angle;
use kestrel_core::telemetry::{
    FlightMode, Odometry, Setpoint, TelemetryBoard, TelemetrySnapshot, VehicleStatus,
    SYSTEM_STATUS_ACTIVE, SYSTEM_STATUS_STANDBY,
};
use kestrel_core::{MissionError, VehicleLink};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

/// Height above which the vehicle counts as airborne (m).
const LIFTOFF_HEIGHT: f64 = 0.3;
/// Height below which an airborne vehicle counts as touched down (m).
const TOUCHDOWN_HEIGHT: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct SimVehicleConfig {
    /// Seconds before the link reports connected.
    pub connect_delay: f64,
    /// Seconds before the first satellite fix.
    pub fix_delay: f64,

    /// Where the vehicle starts, and the true tangent-plane origin.
    pub home_fix: SatelliteFix,
    /// Odometry origin relative to the true tangent-plane origin (m).
    pub odometry_offset: Vector3<f64>,
    pub initial_yaw: f64,

    pub gps_noise_std: f64, // meters
    pub seed: u64,

    // Point-mass response
    pub position_gain: f64, // 1/s
    pub max_speed: f64,     // m/s
    pub max_yaw_rate: f64,  // rad/s
    pub land_speed: f64,    // m/s, in AUTO.LAND
    pub substeps: u32,

    /// Reject this many arm/mode requests before accepting any.
    pub reject_first_commands: u32,
    /// Operator arms and switches to offboard this long after setpoints
    /// start streaming. `None` leaves it to the mission.
    pub operator_arm_delay: Option<f64>,
}

impl Default for SimVehicleConfig {
    fn default() -> Self {
        Self {
            connect_delay: 0.3,
            fix_delay: 0.5,
            home_fix: SatelliteFix::new(35.0, -106.0, 1500.0),
            odometry_offset: Vector3::new(1.5, -2.0, 0.0),
            initial_yaw: 0.0,
            gps_noise_std: 0.3,
            seed: 42,
            position_gain: 2.0,
            max_speed: 3.0,
            max_yaw_rate: 1.5,
            land_speed: 0.7,
            substeps: 4,
            reject_first_commands: 0,
            operator_arm_delay: None,
        }
    }
}

/// Kinematic multicopter standing in for the flight controller.
///
/// Writes its telemetry to a shared [`TelemetryBoard`] after every step and
/// answers arm/mode requests immediately, like the real command services.
pub struct SimVehicle {
    cfg: SimVehicleConfig,
    board: Arc<TelemetryBoard>,
    rng: StdRng,
    gps_noise: Normal<f64>,

    time: f64,
    position: Vector3<f64>, // true ENU about home_fix
    yaw: f64,
    armed: bool,
    airborne: bool,
    mode: FlightMode,

    setpoint: Option<Setpoint>,
    first_setpoint_time: Option<f64>,
    setpoints_received: u64,
    rejections_left: u32,
    operator_done: bool,
    odometry_snapshots: Vec<Odometry>,
}

impl SimVehicle {
    pub fn new(cfg: SimVehicleConfig) -> Result<Self, MissionError> {
        Self::with_board(cfg, Arc::new(TelemetryBoard::new()))
    }

    /// Publish into an existing board, e.g. one shared with another task.
    pub fn with_board(cfg: SimVehicleConfig, board: Arc<TelemetryBoard>) -> Result<Self, MissionError> {
        let gps_noise =
            Normal::new(0.0, cfg.gps_noise_std).map_err(|_| MissionError::InvalidParameter {
                name: "gps_noise_std",
                value: cfg.gps_noise_std,
                reason: "must be finite and non-negative",
            })?;
        if cfg.substeps == 0 {
            return Err(MissionError::InvalidParameter {
                name: "substeps",
                value: 0.0,
                reason: "must step at least once",
            });
        }

        let mut vehicle = Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            gps_noise,
            time: 0.0,
            position: Vector3::zeros(),
            yaw: cfg.initial_yaw,
            armed: false,
            airborne: false,
            mode: FlightMode::Manual,
            setpoint: None,
            first_setpoint_time: None,
            setpoints_received: 0,
            rejections_left: cfg.reject_first_commands,
            operator_done: false,
            odometry_snapshots: Vec::new(),
            board,
            cfg,
        };
        vehicle.publish();
        Ok(vehicle)
    }

    pub fn board(&self) -> Arc<TelemetryBoard> {
        Arc::clone(&self.board)
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// True position in the tangent plane about the home fix.
    pub fn true_position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn setpoints_received(&self) -> u64 {
        self.setpoints_received
    }

    pub fn odometry_snapshots(&self) -> &[Odometry] {
        &self.odometry_snapshots
    }

    /// Advance the physics by `dt` seconds and publish telemetry.
    pub fn step(&mut self, dt: f64) {
        let h = dt / self.cfg.substeps as f64;
        for _ in 0..self.cfg.substeps {
            self.time += h;
            self.operator_input();
            self.integrate(h);
        }
        self.publish();
    }

    /// The operator arms and selects offboard once, `operator_arm_delay`
    /// after the setpoint stream starts.
    fn operator_input(&mut self) {
        if self.operator_done {
            return;
        }
        let (Some(delay), Some(start)) = (self.cfg.operator_arm_delay, self.first_setpoint_time)
        else {
            return;
        };
        if self.time - start >= delay {
            debug!(time = self.time, "operator arms and selects offboard");
            self.armed = true;
            self.mode = FlightMode::Offboard;
            self.operator_done = true;
        }
    }

    fn integrate(&mut self, h: f64) {
        match (self.armed, self.mode, self.setpoint) {
            (true, FlightMode::Offboard, Some(sp)) => {
                let target = sp.position - self.cfg.odometry_offset;
                let mut velocity = (target - self.position) * self.cfg.position_gain;
                let speed = velocity.norm();
                if speed > self.cfg.max_speed {
                    velocity *= self.cfg.max_speed / speed;
                }
                self.position += velocity * h;

                let max_turn = self.cfg.max_yaw_rate * h;
                let turn = wrap_angle(sp.yaw - self.yaw).clamp(-max_turn, max_turn);
                self.yaw = wrap_angle(self.yaw + turn);
            }
            (true, FlightMode::AutoLand, _) => {
                self.position.z -= self.cfg.land_speed * h;
            }
            _ => {}
        }

        if self.position.z <= 0.0 {
            self.position.z = 0.0;
        }
        if self.position.z > LIFTOFF_HEIGHT {
            self.airborne = true;
        } else if self.airborne && self.position.z < TOUCHDOWN_HEIGHT {
            self.airborne = false;
            debug!(time = self.time, "touchdown");
            if self.mode == FlightMode::AutoLand {
                self.armed = false;
            }
        }
    }

    fn publish(&mut self) {
        let system_status = if self.armed && self.airborne {
            SYSTEM_STATUS_ACTIVE
        } else {
            SYSTEM_STATUS_STANDBY
        };
        self.board.status.update(VehicleStatus {
            connected: self.time >= self.cfg.connect_delay,
            armed: self.armed,
            mode: self.mode,
            system_status,
        });
        self.board.odometry.update(Odometry::new(
            self.position + self.cfg.odometry_offset,
            self.yaw,
        ));

        if self.time >= self.cfg.fix_delay {
            let noise = Vector3::new(
                self.gps_noise.sample(&mut self.rng),
                self.gps_noise.sample(&mut self.rng),
                self.gps_noise.sample(&mut self.rng),
            );
            let fix = geodetic::to_geodetic(&(self.position + noise), &self.cfg.home_fix);
            self.board.publish_fix(fix);
        }
    }

    fn accept_command(&mut self) -> bool {
        if !self.board.status.read().connected {
            return false;
        }
        if self.rejections_left > 0 {
            self.rejections_left -= 1;
            return false;
        }
        true
    }
}

impl VehicleLink for SimVehicle {
    fn telemetry(&mut self) -> TelemetrySnapshot {
        self.board.snapshot()
    }

    fn publish_setpoint(&mut self, setpoint: &Setpoint) {
        self.setpoint = Some(*setpoint);
        self.setpoints_received += 1;
        self.first_setpoint_time.get_or_insert(self.time);
    }

    fn arm(&mut self, arm: bool) -> bool {
        if !self.accept_command() {
            return false;
        }
        self.armed = arm;
        true
    }

    fn set_mode(&mut self, mode: FlightMode) -> bool {
        if !self.accept_command() {
            return false;
        }
        // Offboard needs a setpoint stream already running.
        if mode == FlightMode::Offboard && self.setpoints_received == 0 {
            return false;
        }
        self.mode = mode;
        true
    }

    fn publish_odometry_snapshot(&mut self, odometry: &Odometry) {
        self.odometry_snapshots.push(*odometry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> SimVehicleConfig {
        SimVehicleConfig {
            gps_noise_std: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn test_connects_then_fixes() {
        let mut sim = SimVehicle::new(quiet()).unwrap();
        assert!(!sim.telemetry().status.connected);
        for _ in 0..4 {
            sim.step(0.1);
        }
        let snap = sim.telemetry();
        assert!(snap.status.connected);
        assert!(!snap.fix_acquired());
        for _ in 0..2 {
            sim.step(0.1);
        }
        assert!(sim.telemetry().fix_acquired());
    }

    #[test]
    fn test_odometry_carries_offset() {
        let mut sim = SimVehicle::new(quiet()).unwrap();
        sim.step(0.1);
        let snap = sim.telemetry();
        assert_eq!(snap.odometry.position, Vector3::new(1.5, -2.0, 0.0));
    }

    #[test]
    fn test_offboard_needs_setpoints() {
        let mut sim = SimVehicle::new(quiet()).unwrap();
        for _ in 0..5 {
            sim.step(0.1);
        }
        assert!(!sim.set_mode(FlightMode::Offboard));
        sim.publish_setpoint(&Setpoint::new(Vector3::new(1.5, -2.0, 2.0), 0.0));
        assert!(sim.set_mode(FlightMode::Offboard));
        assert!(sim.arm(true));
    }

    #[test]
    fn test_rejects_first_commands() {
        let mut sim = SimVehicle::new(SimVehicleConfig {
            reject_first_commands: 2,
            ..quiet()
        })
        .unwrap();
        for _ in 0..5 {
            sim.step(0.1);
        }
        assert!(!sim.arm(true));
        assert!(!sim.arm(true));
        assert!(sim.arm(true));
    }

    #[test]
    fn test_tracks_setpoint_and_reports_active() {
        let mut sim = SimVehicle::new(quiet()).unwrap();
        for _ in 0..5 {
            sim.step(0.1);
        }
        sim.publish_setpoint(&Setpoint::new(Vector3::new(1.5, -2.0, 3.0), 0.5));
        assert!(sim.set_mode(FlightMode::Offboard));
        assert!(sim.arm(true));
        for _ in 0..60 {
            sim.step(0.1);
        }
        let snap = sim.telemetry();
        assert!((snap.odometry.position.z - 3.0).abs() < 0.05);
        assert!((snap.odometry.yaw() - 0.5).abs() < 1e-9);
        assert_eq!(snap.status.system_status, SYSTEM_STATUS_ACTIVE);

        assert!(sim.set_mode(FlightMode::AutoLand));
        for _ in 0..80 {
            sim.step(0.1);
        }
        let snap = sim.telemetry();
        assert!(snap.status.is_standby());
        assert!(!snap.status.armed);
        assert_eq!(snap.odometry.position.z, 0.0);
    }

    #[test]
    fn test_operator_arming() {
        let mut sim = SimVehicle::new(SimVehicleConfig {
            operator_arm_delay: Some(1.0),
            ..quiet()
        })
        .unwrap();
        sim.step(0.1);
        sim.publish_setpoint(&Setpoint::new(Vector3::zeros(), 0.0));
        for _ in 0..9 {
            sim.step(0.1);
        }
        assert!(!sim.telemetry().status.is_offboard_armed());
        for _ in 0..2 {
            sim.step(0.1);
        }
        assert!(sim.telemetry().status.is_offboard_armed());
    }

    #[test]
    fn test_negative_noise_rejected() {
        let cfg = SimVehicleConfig {
            gps_noise_std: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            SimVehicle::new(cfg),
            Err(MissionError::InvalidParameter { name: "gps_noise_std", .. })
        ));
    }
}
