use nalgebra::Vector3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::calibration::{HomeFrame, HomeFrameCalibrator};
use crate::config::MissionConfig;
use crate::error::Result;
use crate::link::VehicleLink;
use crate::motion::{self, ROTATE_IN_PLACE_THRESHOLD};
use crate::telemetry::{FlightMode, Pose, Setpoint, TelemetrySnapshot};

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum MissionPhase {
    AwaitConnection = 0,
    AwaitFix = 1,
    Calibrating = 2,
    StreamInit = 3,
    AwaitArmOffboard = 4,
    Takeoff = 5,
    Hover = 6,
    Enroute = 7,
    FinalHover = 8,
    PreReturnDelivery = 9,
    ReturnHome = 10,
    Delivery = 11,
    Landing = 12,
    Finished = 13,
}

impl MissionPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::AwaitConnection => "AwaitConnection",
            Self::AwaitFix => "AwaitFix",
            Self::Calibrating => "Calibrating",
            Self::StreamInit => "StreamInit",
            Self::AwaitArmOffboard => "AwaitArmOffboard",
            Self::Takeoff => "Takeoff",
            Self::Hover => "Hover",
            Self::Enroute => "Enroute",
            Self::FinalHover => "FinalHover",
            Self::PreReturnDelivery => "PreReturnDelivery",
            Self::ReturnHome => "ReturnHome",
            Self::Delivery => "Delivery",
            Self::Landing => "Landing",
            Self::Finished => "Finished",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissionStatus {
    Running,
    Finished,
}

/// One entry per phase entered, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseRecord {
    pub tick: u64,
    pub phase: MissionPhase,
    pub waypoint: Option<usize>,
}

// ---------------------------------------------------------------------------
// Internal stages
// ---------------------------------------------------------------------------

/// Where a delivery hands control back once the climb-out hover ends.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Resume {
    Enroute,
    ReturnHome,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum AfterHover {
    Enroute,
    Landing(Pose),
    Resume(Resume),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeliveryStage {
    Descend,
    Unpack { hold: Setpoint, remaining: u32 },
    ClimbOut,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Stage {
    AwaitConnection,
    AwaitFix,
    Calibrating,
    StreamInit {
        setpoint: Setpoint,
        remaining: u32,
    },
    AwaitArmOffboard {
        setpoint: Setpoint,
    },
    Takeoff {
        target: Pose,
    },
    Hover {
        hold: Setpoint,
        remaining: u32,
        after: AfterHover,
    },
    Enroute,
    FinalHover {
        hold: Setpoint,
        remaining: u32,
    },
    PreReturnDelivery,
    ReturnHome {
        target: Pose,
        home: Pose,
    },
    Delivery {
        waypoint: usize,
        yaw: f64,
        stage: DeliveryStage,
        resume: Resume,
    },
    Landing {
        target: Pose,
    },
    Finished,
}

impl Stage {
    fn phase(&self) -> MissionPhase {
        match self {
            Self::AwaitConnection => MissionPhase::AwaitConnection,
            Self::AwaitFix => MissionPhase::AwaitFix,
            Self::Calibrating => MissionPhase::Calibrating,
            Self::StreamInit { .. } => MissionPhase::StreamInit,
            Self::AwaitArmOffboard { .. } => MissionPhase::AwaitArmOffboard,
            Self::Takeoff { .. } => MissionPhase::Takeoff,
            Self::Hover { .. } => MissionPhase::Hover,
            Self::Enroute => MissionPhase::Enroute,
            Self::FinalHover { .. } => MissionPhase::FinalHover,
            Self::PreReturnDelivery => MissionPhase::PreReturnDelivery,
            Self::ReturnHome { .. } => MissionPhase::ReturnHome,
            Self::Delivery { .. } => MissionPhase::Delivery,
            Self::Landing { .. } => MissionPhase::Landing,
            Self::Finished => MissionPhase::Finished,
        }
    }
}

/// Result of running one phase handler.
enum Flow {
    Publish(Setpoint),
    /// Nothing to send this tick.
    Idle,
    /// Phase changed; run the new phase on the same snapshot.
    Continue,
    Finished,
}

// ---------------------------------------------------------------------------
// State Machine
// ---------------------------------------------------------------------------

pub struct MissionStateMachine {
    config: MissionConfig,
    stage: Stage,

    calibrator: HomeFrameCalibrator,
    home: Option<HomeFrame>,

    /// Index of the waypoint being flown to. Never decreases.
    waypoint_index: usize,
    waypoints_reached: usize,
    /// Position latched while rotating in place.
    hold_position: Option<Vector3<f64>>,
    /// Last en-route sample with a small heading error. Survives waypoint
    /// changes; reseeded when Enroute is entered from another phase.
    last_aligned: Option<Vector3<f64>>,

    tick_count: u64,
    operation_start: Option<u64>,
    operation_end: Option<u64>,
    last_setpoint: Option<Setpoint>,
    phase_log: Vec<PhaseRecord>,
}

impl MissionStateMachine {
    pub fn new(config: MissionConfig) -> Result<Self> {
        config.validate()?;

        let calibrator = HomeFrameCalibrator::new(config.offset_reference);
        Ok(Self {
            config,
            stage: Stage::AwaitConnection,
            calibrator,
            home: None,
            waypoint_index: 0,
            waypoints_reached: 0,
            hold_position: None,
            last_aligned: None,
            tick_count: 0,
            operation_start: None,
            operation_end: None,
            last_setpoint: None,
            phase_log: vec![PhaseRecord {
                tick: 0,
                phase: MissionPhase::AwaitConnection,
                waypoint: None,
            }],
        })
    }

    /// Run one control cycle: one telemetry read, at most one setpoint.
    pub fn tick<L: VehicleLink>(&mut self, link: &mut L) -> MissionStatus {
        if self.stage == Stage::Finished {
            return MissionStatus::Finished;
        }

        self.tick_count += 1;
        self.last_setpoint = None;
        let snapshot = link.telemetry();

        loop {
            match self.step(&snapshot, link) {
                Flow::Continue => continue,
                Flow::Publish(setpoint) => {
                    link.publish_setpoint(&setpoint);
                    self.last_setpoint = Some(setpoint);
                    return MissionStatus::Running;
                }
                Flow::Idle => return MissionStatus::Running,
                Flow::Finished => return MissionStatus::Finished,
            }
        }
    }

    fn step<L: VehicleLink>(&mut self, snapshot: &TelemetrySnapshot, link: &mut L) -> Flow {
        let current = snapshot.odometry.position;
        let current_yaw = snapshot.odometry.yaw();

        match self.stage {
            Stage::AwaitConnection => {
                if snapshot.status.connected {
                    self.enter(Stage::AwaitFix);
                    Flow::Continue
                } else {
                    Flow::Idle
                }
            }

            Stage::AwaitFix => {
                if snapshot.fix_acquired() {
                    info!(
                        self_arm = self.config.simulation_mode,
                        delivery = self.config.delivery_enabled,
                        return_home = self.config.return_home_enabled,
                        "satellite fix acquired"
                    );
                    self.operation_start = Some(self.tick_count);
                    self.enter(Stage::Calibrating);
                    Flow::Continue
                } else {
                    Flow::Idle
                }
            }

            Stage::Calibrating => {
                let Some(fix) = snapshot.fix else {
                    return Flow::Idle;
                };
                self.calibrator.sample(&snapshot.odometry, &fix);
                if self.calibrator.sample_count() < self.config.calibration_samples {
                    return Flow::Idle;
                }

                match self.calibrator.finalize() {
                    Ok(frame) => {
                        info!(
                            samples = frame.samples,
                            offset_x = frame.frame_offset.x,
                            offset_y = frame.frame_offset.y,
                            offset_z = frame.frame_offset.z,
                            "home frame captured"
                        );
                        self.home = Some(frame);
                        let start = Vector3::new(current.x, current.y, self.config.takeoff_altitude);
                        self.enter(Stage::StreamInit {
                            setpoint: Setpoint::new(start, current_yaw),
                            remaining: self.config.stream_init_ticks,
                        });
                        Flow::Continue
                    }
                    Err(e) => {
                        warn!(error = %e, "calibration could not be finalized");
                        Flow::Idle
                    }
                }
            }

            Stage::StreamInit {
                setpoint,
                remaining,
            } => {
                if remaining == 0 {
                    self.enter(Stage::AwaitArmOffboard { setpoint });
                    return Flow::Continue;
                }
                self.stage = Stage::StreamInit {
                    setpoint,
                    remaining: remaining - 1,
                };
                Flow::Publish(setpoint)
            }

            Stage::AwaitArmOffboard { setpoint } => {
                if snapshot.status.is_offboard_armed() {
                    if self.config.publish_arm_odometry {
                        link.publish_odometry_snapshot(&snapshot.odometry);
                    }
                    self.enter(Stage::Takeoff { target: setpoint });
                    return Flow::Continue;
                }

                if self.config.simulation_mode {
                    self.request_arm_offboard(snapshot, link);
                } else {
                    debug!(
                        armed = snapshot.status.armed,
                        mode = snapshot.status.mode.as_str(),
                        "waiting for operator to arm and switch to offboard"
                    );
                }
                Flow::Publish(setpoint)
            }

            Stage::Takeoff { target } => {
                if motion::position_reached(self.config.target_tolerance, &current, &target.position) {
                    self.enter(Stage::Hover {
                        hold: target,
                        remaining: self.config.ticks_for(self.config.takeoff_hover_time),
                        after: AfterHover::Enroute,
                    });
                    return Flow::Continue;
                }
                Flow::Publish(self.approach(&current, &target, self.config.cruise_speed))
            }

            Stage::Hover {
                hold,
                remaining,
                after,
            } => {
                if remaining == 0 {
                    let next = match after {
                        AfterHover::Enroute | AfterHover::Resume(Resume::Enroute) => Stage::Enroute,
                        AfterHover::Landing(target) => Stage::Landing { target },
                        AfterHover::Resume(Resume::ReturnHome) => self.return_home_stage(snapshot),
                    };
                    self.enter(next);
                    return Flow::Continue;
                }
                self.stage = Stage::Hover {
                    hold,
                    remaining: remaining - 1,
                    after,
                };
                Flow::Publish(hold)
            }

            Stage::Enroute => self.enroute(&current, current_yaw),

            Stage::FinalHover { hold, remaining } => {
                if remaining == 0 {
                    if self.config.return_home_enabled {
                        self.enter(Stage::PreReturnDelivery);
                    } else {
                        let last = self.final_waypoint();
                        let target = Pose::new(Vector3::new(last.x, last.y, 0.0), hold.yaw);
                        self.enter(Stage::Landing { target });
                    }
                    return Flow::Continue;
                }
                self.stage = Stage::FinalHover {
                    hold,
                    remaining: remaining - 1,
                };
                Flow::Publish(hold)
            }

            Stage::PreReturnDelivery => {
                let next = if self.config.delivery_enabled {
                    Stage::Delivery {
                        waypoint: self.config.waypoints.len() - 1,
                        yaw: current_yaw,
                        stage: DeliveryStage::Descend,
                        resume: Resume::ReturnHome,
                    }
                } else {
                    self.return_home_stage(snapshot)
                };
                self.enter(next);
                Flow::Continue
            }

            Stage::ReturnHome { target, home } => {
                if motion::position_reached(self.config.target_tolerance, &current, &target.position) {
                    self.enter(Stage::Hover {
                        hold: target,
                        remaining: self.config.ticks_for(self.config.hover_time),
                        after: AfterHover::Landing(home),
                    });
                    return Flow::Continue;
                }
                Flow::Publish(self.approach(&current, &target, self.config.return_speed))
            }

            Stage::Delivery {
                waypoint,
                yaw,
                stage,
                resume,
            } => self.delivery(snapshot, waypoint, yaw, stage, resume),

            Stage::Landing { target } => {
                let touched_down = snapshot.status.is_standby()
                    || motion::position_reached(self.config.landing_tolerance, &current, &target.position);
                if !touched_down {
                    return Flow::Publish(self.approach(&current, &target, self.config.landing_speed));
                }

                if link.set_mode(FlightMode::AutoLand) {
                    self.operation_end = Some(self.tick_count);
                    info!(
                        operation_time_s = self.operation_time(),
                        "land mode accepted, mission finished"
                    );
                    self.enter(Stage::Finished);
                    Flow::Finished
                } else {
                    warn!(tick = self.tick_count, "land mode request rejected, retrying");
                    Flow::Publish(Setpoint::new(current, target.yaw))
                }
            }

            Stage::Finished => Flow::Finished,
        }
    }

    // ---------------------------------------------------------------------
    // Phase helpers
    // ---------------------------------------------------------------------

    fn request_arm_offboard<L: VehicleLink>(&self, snapshot: &TelemetrySnapshot, link: &mut L) {
        if snapshot.status.mode != FlightMode::Offboard {
            if link.set_mode(FlightMode::Offboard) {
                info!(tick = self.tick_count, "offboard mode accepted");
            } else {
                warn!(tick = self.tick_count, "offboard mode request rejected, retrying");
            }
        }
        if !snapshot.status.armed {
            if link.arm(true) {
                info!(tick = self.tick_count, "arm accepted");
            } else {
                warn!(tick = self.tick_count, "arm request rejected, retrying");
            }
        }
    }

    fn enroute(&mut self, current: &Vector3<f64>, current_yaw: f64) -> Flow {
        let target = self.config.waypoints[self.waypoint_index].to_vector();

        if motion::position_reached(self.config.target_tolerance, current, &target) {
            info!(
                waypoint = self.waypoint_index,
                x = target.x,
                y = target.y,
                z = target.z,
                "waypoint reached"
            );
            let reached = self.waypoint_index;
            self.waypoints_reached += 1;
            if reached + 1 < self.config.waypoints.len() {
                self.waypoint_index += 1;
                let next = if self.config.delivery_enabled {
                    Stage::Delivery {
                        waypoint: reached,
                        yaw: current_yaw,
                        stage: DeliveryStage::Descend,
                        resume: Resume::Enroute,
                    }
                } else {
                    Stage::Enroute
                };
                self.enter(next);
            } else {
                self.enter(Stage::FinalHover {
                    hold: Setpoint::new(*current, current_yaw),
                    remaining: self.config.ticks_for(self.config.hover_time),
                });
            }
            return Flow::Continue;
        }

        let distance = motion::distance(current, &target);
        let speed = motion::approach_speed(
            distance,
            self.config.cruise_speed,
            self.config.deceleration_speed,
        );
        let bearing = motion::yaw_target(current, &target);
        let yaw = motion::yaw_step(current_yaw, bearing, self.config.yaw_rate);
        let error = motion::heading_error(current_yaw, bearing);

        let aligned = *self.last_aligned.get_or_insert(*current);
        let position = if error < ROTATE_IN_PLACE_THRESHOLD {
            self.hold_position = None;
            self.last_aligned = Some(*current);
            match motion::velocity(speed, current, &target) {
                Some(v) => current + v,
                None => *current,
            }
        } else {
            let held = *self.hold_position.get_or_insert(aligned);
            debug!(heading_error = error, commanded_yaw = yaw, "rotating in place");
            held
        };

        Flow::Publish(Setpoint::new(position, yaw))
    }

    fn delivery(
        &mut self,
        snapshot: &TelemetrySnapshot,
        waypoint: usize,
        yaw: f64,
        stage: DeliveryStage,
        resume: Resume,
    ) -> Flow {
        let current = snapshot.odometry.position;
        let above = self.config.waypoints[waypoint].to_vector();
        let drop_point = Vector3::new(above.x, above.y, self.config.delivery_altitude);

        match stage {
            DeliveryStage::Descend => {
                let standby = snapshot.status.is_standby();
                if standby
                    || motion::position_reached(self.config.landing_tolerance, &current, &drop_point)
                {
                    let hold = if standby {
                        snapshot.odometry.pose()
                    } else {
                        Setpoint::new(drop_point, yaw)
                    };
                    debug!(waypoint, standby, "delivery point reached, unpacking");
                    self.stage = Stage::Delivery {
                        waypoint,
                        yaw,
                        stage: DeliveryStage::Unpack {
                            hold,
                            remaining: self.config.ticks_for(self.config.unpack_time),
                        },
                        resume,
                    };
                    return Flow::Continue;
                }
                Flow::Publish(self.approach(&current, &Pose::new(drop_point, yaw), self.config.cruise_speed))
            }
            DeliveryStage::Unpack { hold, remaining } => {
                if remaining == 0 {
                    debug!(waypoint, "unpack complete, climbing out");
                    self.stage = Stage::Delivery {
                        waypoint,
                        yaw,
                        stage: DeliveryStage::ClimbOut,
                        resume,
                    };
                    return Flow::Continue;
                }
                self.stage = Stage::Delivery {
                    waypoint,
                    yaw,
                    stage: DeliveryStage::Unpack {
                        hold,
                        remaining: remaining - 1,
                    },
                    resume,
                };
                Flow::Publish(hold)
            }
            DeliveryStage::ClimbOut => {
                let target = Pose::new(above, yaw);
                if motion::position_reached(self.config.target_tolerance, &current, &above) {
                    self.enter(Stage::Hover {
                        hold: target,
                        remaining: self.config.ticks_for(self.config.hover_time),
                        after: AfterHover::Resume(resume),
                    });
                    return Flow::Continue;
                }
                Flow::Publish(self.approach(&current, &target, self.config.cruise_speed))
            }
        }
    }

    /// `current + velocity` toward `target`, holding the target yaw.
    fn approach(&self, current: &Vector3<f64>, target: &Pose, speed: f64) -> Setpoint {
        let position = match motion::velocity(speed, current, &target.position) {
            Some(v) => current + v,
            None => target.position,
        };
        Setpoint::new(position, target.yaw)
    }

    fn return_home_stage(&self, snapshot: &TelemetrySnapshot) -> Stage {
        let home = self
            .home
            .as_ref()
            .map(|h| h.home_local_pose)
            .unwrap_or_else(|| snapshot.odometry.pose());
        let altitude = self.final_waypoint().z;
        let yaw = snapshot.odometry.yaw();
        Stage::ReturnHome {
            target: Pose::new(Vector3::new(home.position.x, home.position.y, altitude), yaw),
            home,
        }
    }

    fn final_waypoint(&self) -> Vector3<f64> {
        // Non-empty: checked by `MissionConfig::validate`.
        self.config.waypoints[self.config.waypoints.len() - 1].to_vector()
    }

    fn enter(&mut self, stage: Stage) {
        let phase = stage.phase();
        let waypoint = match stage {
            Stage::Enroute => Some(self.waypoint_index),
            Stage::Delivery { waypoint, .. } => Some(waypoint),
            _ => None,
        };
        self.hold_position = None;
        if stage == Stage::Enroute && self.stage != Stage::Enroute {
            self.last_aligned = None;
        }

        info!(
            tick = self.tick_count,
            from = self.stage.phase().label(),
            to = phase.label(),
            waypoint = ?waypoint,
            "phase transition"
        );
        self.stage = stage;
        self.phase_log.push(PhaseRecord {
            tick: self.tick_count,
            phase,
            waypoint,
        });
    }

    // ---------------------------------------------------------------------
    // Accessors
    // ---------------------------------------------------------------------

    pub fn phase(&self) -> MissionPhase {
        self.stage.phase()
    }

    pub fn config(&self) -> &MissionConfig {
        &self.config
    }

    pub fn waypoint_index(&self) -> usize {
        self.waypoint_index
    }

    pub fn waypoints_reached(&self) -> usize {
        self.waypoints_reached
    }

    pub fn home_frame(&self) -> Option<&HomeFrame> {
        self.home.as_ref()
    }

    /// True while translation is suspended for a heading correction.
    pub fn is_holding(&self) -> bool {
        self.hold_position.is_some()
    }

    /// Setpoint published on the most recent tick, if any.
    pub fn last_setpoint(&self) -> Option<Setpoint> {
        self.last_setpoint
    }

    pub fn phase_log(&self) -> &[PhaseRecord] {
        &self.phase_log
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Ticks from fix acquisition to land-mode acceptance (or now).
    pub fn operation_ticks(&self) -> u64 {
        match self.operation_start {
            Some(start) => self.operation_end.unwrap_or(self.tick_count) - start,
            None => 0,
        }
    }

    pub fn operation_time(&self) -> f64 {
        self.operation_ticks() as f64 * self.config.tick_period()
    }

    pub fn is_finished(&self) -> bool {
        self.stage == Stage::Finished
    }
}
