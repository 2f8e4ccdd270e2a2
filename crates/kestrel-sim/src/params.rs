//! Parameter definitions for mission sweeps.

use kestrel_core::MissionConfig;

use crate::vehicle::SimVehicleConfig;

/// Parameter specification with bounds and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Human-readable label.
    pub label: &'static str,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Smallest meaningful increment.
    pub step: f64,
}

impl ParamSpec {
    /// Create a new parameter specification.
    pub const fn new(label: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self {
            label,
            min,
            max,
            step,
        }
    }

    /// `steps` evenly spaced values from `min` to `max` inclusive.
    pub fn values(&self, steps: usize) -> Vec<f64> {
        match steps {
            0 => Vec::new(),
            1 => vec![self.min],
            n => (0..n)
                .map(|i| self.min + (self.max - self.min) * (i as f64 / (n - 1) as f64))
                .collect(),
        }
    }
}

/// Mission tuning parameters.
pub mod mission_params {
    use super::ParamSpec;

    pub const TARGET_TOLERANCE: ParamSpec = ParamSpec::new("Target Tolerance (m)", 0.1, 2.0, 0.05);
    pub const LANDING_TOLERANCE: ParamSpec = ParamSpec::new("Landing Tolerance (m)", 0.05, 1.0, 0.05);
    pub const CRUISE_SPEED: ParamSpec = ParamSpec::new("Cruise Lead (m)", 0.2, 3.0, 0.1);
    pub const DECELERATION_SPEED: ParamSpec = ParamSpec::new("Approach Lead (m)", 0.1, 1.0, 0.05);
    pub const LANDING_SPEED: ParamSpec = ParamSpec::new("Landing Lead (m)", 0.1, 1.5, 0.05);
    pub const RETURN_SPEED: ParamSpec = ParamSpec::new("Return Lead (m)", 0.2, 3.0, 0.1);
    pub const YAW_RATE: ParamSpec = ParamSpec::new("Yaw Step (rad/tick)", 0.02, 0.5, 0.01);
    pub const TAKEOFF_ALTITUDE: ParamSpec = ParamSpec::new("Takeoff Alt (m)", 1.0, 30.0, 0.5);
    pub const HOVER_TIME: ParamSpec = ParamSpec::new("Hover (s)", 0.0, 10.0, 0.5);
}

/// Simulated vehicle parameters.
pub mod vehicle_params {
    use super::ParamSpec;

    pub const GPS_NOISE: ParamSpec = ParamSpec::new("GPS Noise σ (m)", 0.0, 5.0, 0.1);
    pub const MAX_SPEED: ParamSpec = ParamSpec::new("Max Speed (m/s)", 0.5, 10.0, 0.5);
}

/// Mission parameters that can be swept, by config field name.
pub const SWEEPABLE: [(&str, ParamSpec); 9] = [
    ("target_tolerance", mission_params::TARGET_TOLERANCE),
    ("landing_tolerance", mission_params::LANDING_TOLERANCE),
    ("cruise_speed", mission_params::CRUISE_SPEED),
    ("deceleration_speed", mission_params::DECELERATION_SPEED),
    ("landing_speed", mission_params::LANDING_SPEED),
    ("return_speed", mission_params::RETURN_SPEED),
    ("yaw_rate", mission_params::YAW_RATE),
    ("takeoff_altitude", mission_params::TAKEOFF_ALTITUDE),
    ("hover_time", mission_params::HOVER_TIME),
];

/// Simulated vehicle parameters that can be swept.
pub const VEHICLE_SWEEPABLE: [(&str, ParamSpec); 2] = [
    ("gps_noise_std", vehicle_params::GPS_NOISE),
    ("max_speed", vehicle_params::MAX_SPEED),
];

/// Look up a sweep range in either table.
pub fn sweep_spec(name: &str) -> Option<ParamSpec> {
    SWEEPABLE
        .iter()
        .chain(VEHICLE_SWEEPABLE.iter())
        .find(|(field, _)| *field == name)
        .map(|(_, spec)| *spec)
}

pub fn get_mission_param(cfg: &MissionConfig, name: &str) -> Option<f64> {
    Some(match name {
        "target_tolerance" => cfg.target_tolerance,
        "landing_tolerance" => cfg.landing_tolerance,
        "cruise_speed" => cfg.cruise_speed,
        "deceleration_speed" => cfg.deceleration_speed,
        "landing_speed" => cfg.landing_speed,
        "return_speed" => cfg.return_speed,
        "yaw_rate" => cfg.yaw_rate,
        "takeoff_altitude" => cfg.takeoff_altitude,
        "hover_time" => cfg.hover_time,
        _ => return None,
    })
}

/// Returns `false` for names not in [`SWEEPABLE`].
pub fn set_mission_param(cfg: &mut MissionConfig, name: &str, value: f64) -> bool {
    let slot = match name {
        "target_tolerance" => &mut cfg.target_tolerance,
        "landing_tolerance" => &mut cfg.landing_tolerance,
        "cruise_speed" => &mut cfg.cruise_speed,
        "deceleration_speed" => &mut cfg.deceleration_speed,
        "landing_speed" => &mut cfg.landing_speed,
        "return_speed" => &mut cfg.return_speed,
        "yaw_rate" => &mut cfg.yaw_rate,
        "takeoff_altitude" => &mut cfg.takeoff_altitude,
        "hover_time" => &mut cfg.hover_time,
        _ => return false,
    };
    *slot = value;
    true
}

pub fn set_vehicle_param(cfg: &mut SimVehicleConfig, name: &str, value: f64) -> bool {
    match name {
        "gps_noise_std" => cfg.gps_noise_std = value,
        "max_speed" => cfg.max_speed = value,
        _ => return false,
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_spec() {
        let spec = ParamSpec::new("Test", 0.0, 100.0, 1.0);
        assert_eq!(spec.label, "Test");
        assert_eq!(spec.min, 0.0);
        assert_eq!(spec.max, 100.0);
        assert_eq!(spec.step, 1.0);
    }

    #[test]
    fn test_values_span_range() {
        let values = mission_params::YAW_RATE.values(5);
        assert_eq!(values.len(), 5);
        assert_eq!(values[0], 0.02);
        assert!((values[4] - 0.5).abs() < 1e-12);
        assert_eq!(mission_params::YAW_RATE.values(1), vec![0.02]);
        assert!(mission_params::YAW_RATE.values(0).is_empty());
    }

    #[test]
    fn test_every_sweepable_param_is_settable() {
        let mut cfg = MissionConfig::default();
        for (name, spec) in SWEEPABLE {
            assert!(set_mission_param(&mut cfg, name, spec.max), "{name}");
            assert_eq!(get_mission_param(&cfg, name), Some(spec.max));
        }
        assert!(!set_mission_param(&mut cfg, "unknown_param", 1.0));
        assert!(get_mission_param(&cfg, "unknown_param").is_none());
        assert!(sweep_spec("unknown_param").is_none());
        assert_eq!(sweep_spec("cruise_speed"), Some(mission_params::CRUISE_SPEED));
    }

    #[test]
    fn test_vehicle_params() {
        let mut cfg = SimVehicleConfig::default();
        assert!(set_vehicle_param(&mut cfg, "gps_noise_std", 1.5));
        assert_eq!(cfg.gps_noise_std, 1.5);
        assert!(!set_vehicle_param(&mut cfg, "cruise_speed", 1.0));
        assert_eq!(sweep_spec("max_speed"), Some(vehicle_params::MAX_SPEED));
    }
}
