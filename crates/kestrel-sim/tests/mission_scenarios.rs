//! End-to-end missions flown against the simulated vehicle.

use kestrel_core::motion;
use kestrel_core::state_machine::MissionPhase;
use kestrel_core::{MissionConfig, MissionError, OffsetReference, Waypoint};
use kestrel_sim::{run_mission, MissionResult, SimVehicleConfig};
use nalgebra::Vector3;

const MAX_TICKS: u64 = 5000;

fn two_waypoints() -> MissionConfig {
    MissionConfig {
        waypoints: vec![Waypoint::new(10.0, 0.0, 5.0), Waypoint::new(10.0, 10.0, 5.0)],
        target_tolerance: 0.5,
        cruise_speed: 1.0,
        yaw_rate: 0.1,
        delivery_enabled: false,
        return_home_enabled: false,
        ..Default::default()
    }
}

fn phases(result: &MissionResult) -> Vec<(MissionPhase, Option<usize>)> {
    result
        .report
        .phases
        .iter()
        .map(|r| (r.phase, r.waypoint))
        .collect()
}

fn first_tick(result: &MissionResult, phase: MissionPhase) -> u64 {
    result
        .report
        .phases
        .iter()
        .find(|r| r.phase == phase)
        .map(|r| r.tick)
        .unwrap_or_else(|| panic!("{} never entered", phase.label()))
}

#[test]
fn two_waypoint_mission_phase_sequence() {
    let result = run_mission(&two_waypoints(), &SimVehicleConfig::default(), MAX_TICKS).unwrap();

    assert!(result.report.completed, "final phase {:?}", result.report.final_phase);
    assert_eq!(
        phases(&result),
        vec![
            (MissionPhase::AwaitConnection, None),
            (MissionPhase::AwaitFix, None),
            (MissionPhase::Calibrating, None),
            (MissionPhase::StreamInit, None),
            (MissionPhase::AwaitArmOffboard, None),
            (MissionPhase::Takeoff, None),
            (MissionPhase::Hover, None),
            (MissionPhase::Enroute, Some(0)),
            (MissionPhase::Enroute, Some(1)),
            (MissionPhase::FinalHover, None),
            (MissionPhase::Landing, None),
            (MissionPhase::Finished, None),
        ]
    );
    assert_eq!(result.report.waypoints_reached, 2);

    let home = result.report.home.as_ref().unwrap();
    assert_eq!(home.samples, 100);
    assert!((home.frame_offset[0] - 1.5).abs() < 1e-6);
    assert!((home.frame_offset[1] + 2.0).abs() < 1e-6);
    assert!(result.report.fix_drift_m.unwrap() < 3.0);

    // Touched down near the final waypoint's ground projection.
    let last = result.trace.position[result.trace.len() - 1];
    assert!((last - Vector3::new(10.0, 10.0, 0.0)).norm() < 0.5, "landed at {last:?}");
}

#[test]
fn commanded_yaw_is_rate_limited_en_route() {
    let cfg = two_waypoints();
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    let trace = &result.trace;

    let mut compared = 0;
    for k in 1..trace.len() {
        if trace.phase[k - 1] != MissionPhase::Enroute || trace.phase[k] != MissionPhase::Enroute {
            continue;
        }
        let (Some(prev), Some(next)) = (trace.setpoint[k - 1], trace.setpoint[k]) else {
            continue;
        };
        let change = motion::wrap_angle(next.yaw - prev.yaw).abs();
        assert!(
            change <= cfg.yaw_rate + 1e-6,
            "tick {k}: commanded yaw jumped by {change}"
        );
        compared += 1;
    }
    assert!(compared > 50);
}

#[test]
fn commanded_yaw_approaches_bearing() {
    let cfg = two_waypoints();
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    let trace = &result.trace;

    let mut compared = 0;
    for k in 1..trace.len() {
        let same_leg = trace.phase[k - 1] == MissionPhase::Enroute
            && trace.phase[k] == MissionPhase::Enroute
            && trace.waypoint[k - 1] == trace.waypoint[k];
        if !same_leg {
            continue;
        }
        let (Some(prev), Some(next)) = (trace.setpoint[k - 1], trace.setpoint[k]) else {
            continue;
        };
        let target = cfg.waypoints[trace.waypoint[k]].to_vector();
        let bearing = motion::yaw_target(&trace.position[k], &target);
        let before = motion::heading_error(prev.yaw, bearing);
        let after = motion::heading_error(next.yaw, bearing);
        assert!(
            after <= before + 1e-6,
            "tick {k}: commanded yaw moved away from the bearing ({before} -> {after})"
        );
        compared += 1;
    }
    assert!(compared > 50);
}

#[test]
fn heading_error_shrinks_while_holding() {
    let cfg = two_waypoints();
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    let trace = &result.trace;

    let error_at = |k: usize| {
        let target = cfg.waypoints[trace.waypoint[k]].to_vector();
        let bearing = motion::yaw_target(&trace.position[k], &target);
        motion::heading_error(trace.yaw[k], bearing)
    };

    let mut rotating_ticks = 0;
    for k in 1..trace.len() {
        if !(trace.holding[k - 1] && trace.holding[k]) || trace.waypoint[k - 1] != trace.waypoint[k] {
            continue;
        }
        assert!(
            error_at(k) <= error_at(k - 1) + 1e-6,
            "tick {k}: heading error grew from {} to {}",
            error_at(k - 1),
            error_at(k)
        );
        rotating_ticks += 1;
    }
    // The turn at the first waypoint takes many 0.1 rad steps.
    assert!(rotating_ticks >= 5, "only {rotating_ticks} rotating ticks");
}

#[test]
fn hold_point_is_fixed_while_rotating() {
    let result = run_mission(&two_waypoints(), &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    let trace = &result.trace;

    for k in 1..trace.len() {
        if trace.holding[k - 1] && trace.holding[k] && trace.waypoint[k - 1] == trace.waypoint[k] {
            let prev = trace.setpoint[k - 1].unwrap().position;
            let next = trace.setpoint[k].unwrap().position;
            assert_eq!(prev, next, "hold point moved at tick {k}");
        }
    }
}

#[test]
fn delivery_and_return_home() {
    let cfg = MissionConfig {
        delivery_enabled: true,
        return_home_enabled: true,
        ..two_waypoints()
    };
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();

    assert!(result.report.completed);
    assert_eq!(
        phases(&result),
        vec![
            (MissionPhase::AwaitConnection, None),
            (MissionPhase::AwaitFix, None),
            (MissionPhase::Calibrating, None),
            (MissionPhase::StreamInit, None),
            (MissionPhase::AwaitArmOffboard, None),
            (MissionPhase::Takeoff, None),
            (MissionPhase::Hover, None),
            (MissionPhase::Enroute, Some(0)),
            (MissionPhase::Delivery, Some(0)),
            (MissionPhase::Hover, None),
            (MissionPhase::Enroute, Some(1)),
            (MissionPhase::FinalHover, None),
            (MissionPhase::PreReturnDelivery, None),
            (MissionPhase::Delivery, Some(1)),
            (MissionPhase::Hover, None),
            (MissionPhase::ReturnHome, None),
            (MissionPhase::Hover, None),
            (MissionPhase::Landing, None),
            (MissionPhase::Finished, None),
        ]
    );

    // Each delivery dips to the drop altitude.
    let lowest_in_delivery = |waypoint: usize| {
        (0..result.trace.len())
            .filter(|&k| result.trace.phase[k] == MissionPhase::Delivery)
            .filter(|&k| {
                let wp = cfg.waypoints[waypoint].to_vector();
                let p = result.trace.position[k];
                (p.xy() - wp.xy()).norm() < 1.0
            })
            .map(|k| result.trace.position[k].z)
            .fold(f64::INFINITY, f64::min)
    };
    assert!(lowest_in_delivery(0) < cfg.delivery_altitude + 0.3);
    assert!(lowest_in_delivery(1) < cfg.delivery_altitude + 0.3);

    // Landed back at home.
    let home = result.report.home.as_ref().unwrap().home_position;
    let last = result.trace.position[result.trace.len() - 1];
    assert!((last.xy() - Vector3::from(home).xy()).norm() < 0.5, "landed at {last:?}");
}

#[test]
fn return_home_without_delivery() {
    let cfg = MissionConfig {
        return_home_enabled: true,
        ..two_waypoints()
    };
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    assert!(result.report.completed);

    let seq: Vec<MissionPhase> = phases(&result).into_iter().map(|(p, _)| p).collect();
    let tail = &seq[seq.len() - 6..];
    assert_eq!(
        tail,
        [
            MissionPhase::FinalHover,
            MissionPhase::PreReturnDelivery,
            MissionPhase::ReturnHome,
            MissionPhase::Hover,
            MissionPhase::Landing,
            MissionPhase::Finished,
        ]
    );
}

#[test]
fn operator_arms_the_vehicle() {
    let cfg = MissionConfig {
        simulation_mode: false,
        ..two_waypoints()
    };
    // Setpoints stream for 5 s before the mission starts waiting.
    let vehicle = SimVehicleConfig {
        operator_arm_delay: Some(8.0),
        ..Default::default()
    };
    let result = run_mission(&cfg, &vehicle, MAX_TICKS).unwrap();

    assert!(result.report.completed);
    let waited = first_tick(&result, MissionPhase::Takeoff)
        - first_tick(&result, MissionPhase::AwaitArmOffboard);
    assert!(waited >= 20, "waited only {waited} ticks");
}

#[test]
fn without_operator_the_mission_waits() {
    let cfg = MissionConfig {
        simulation_mode: false,
        ..two_waypoints()
    };
    let result = run_mission(&cfg, &SimVehicleConfig::default(), 400).unwrap();

    assert!(!result.report.completed);
    assert_eq!(result.report.final_phase, MissionPhase::AwaitArmOffboard);
    // Still streaming every tick while waiting.
    let last = result.trace.len() - 1;
    assert!(result.trace.setpoint[last].is_some());
}

#[test]
fn rejected_commands_are_retried() {
    let vehicle = SimVehicleConfig {
        reject_first_commands: 5,
        ..Default::default()
    };
    let result = run_mission(&two_waypoints(), &vehicle, MAX_TICKS).unwrap();

    assert!(result.report.completed);
    let waited = first_tick(&result, MissionPhase::Takeoff)
        - first_tick(&result, MissionPhase::AwaitArmOffboard);
    assert!(waited >= 3, "waited only {waited} ticks");
}

#[test]
fn arm_odometry_snapshot_is_published() {
    let cfg = MissionConfig {
        publish_arm_odometry: true,
        ..two_waypoints()
    };
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    let odom = result.report.arm_odometry.unwrap();
    assert!((odom[0] - 1.5).abs() < 1e-6);
    assert!((odom[1] + 2.0).abs() < 1e-6);

    let silent = run_mission(&two_waypoints(), &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    assert!(silent.report.arm_odometry.is_none());
}

#[test]
fn window_start_reference_completes() {
    let cfg = MissionConfig {
        offset_reference: OffsetReference::WindowStart,
        ..two_waypoints()
    };
    let result = run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).unwrap();
    assert!(result.report.completed);
    let offset = result.report.home.as_ref().unwrap().frame_offset;
    // Off by the first fix's noise at most.
    assert!((offset[0] - 1.5).abs() < 1.5);
    assert!((offset[1] + 2.0).abs() < 1.5);
    assert!(result.report.fix_drift_m.unwrap() < 3.0);
}

#[test]
fn invalid_configuration_fails_before_flight() {
    let cfg = MissionConfig {
        waypoints: vec![],
        ..Default::default()
    };
    assert_eq!(
        run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS).err(),
        Some(MissionError::NoWaypoints)
    );

    let cfg = MissionConfig {
        yaw_rate: -0.1,
        ..Default::default()
    };
    assert!(matches!(
        run_mission(&cfg, &SimVehicleConfig::default(), MAX_TICKS),
        Err(MissionError::InvalidParameter { name: "yaw_rate", .. })
    ));
}
