//! Kestrel CLI - Command line interface for simulated offboard missions.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use kestrel_core::{MissionConfig, Waypoint};
use kestrel_sim::{
    get_mission_param, run_mission, set_mission_param, set_vehicle_param, sweep_spec,
    MissionResult, MissionTrace, SimVehicleConfig, SWEEPABLE, VEHICLE_SWEEPABLE,
};
use serde::Serialize;
use tracing::{debug, info};

/// Public function that can be called from the main binary
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::parse_from(args);
    main_inner(args)
}

#[derive(Parser, Debug)]
#[command(name = "kestrel-cli")]
#[command(about = "Simulated multi-waypoint offboard mission runner")]
#[command(version)]
pub struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Trace file format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Mission file (JSON); missing fields keep their defaults
    #[arg(short, long)]
    mission: Option<PathBuf>,

    /// Give up after this many control ticks
    #[arg(long, default_value_t = 20_000)]
    max_ticks: u64,

    // ── Mission overrides ─────────────────────────────────────
    /// Waypoint as "x,y,z"; repeat to replace the mission's list
    #[arg(long = "waypoint", value_parser = parse_waypoint)]
    waypoints: Vec<Waypoint>,

    #[arg(long)]
    target_tolerance: Option<f64>,

    #[arg(long)]
    cruise_speed: Option<f64>,

    #[arg(long)]
    yaw_rate: Option<f64>,

    #[arg(long)]
    takeoff_altitude: Option<f64>,

    #[arg(long)]
    delivery: bool,

    #[arg(long)]
    return_home: bool,

    /// Wait for an operator to arm, who does so this many seconds after
    /// setpoints start streaming
    #[arg(long)]
    operator_arm: Option<f64>,

    // ── Vehicle options ───────────────────────────────────────
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 0.3)]
    gps_noise: f64,

    /// Reject this many arm/mode requests first
    #[arg(long, default_value_t = 0)]
    reject_commands: u32,

    // ── Sweep options ──────────────────────────────────────────
    /// Sweep this parameter over its range instead of flying once
    #[arg(long)]
    sweep_param: Option<String>,

    #[arg(long, default_value_t = 5)]
    sweep_steps: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

fn parse_waypoint(s: &str) -> Result<Waypoint, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, z] = parts.as_slice() else {
        return Err(format!("expected x,y,z, got {s:?}"));
    };
    let num = |v: &str| v.parse::<f64>().map_err(|e| format!("{v:?}: {e}"));
    Ok(Waypoint::new(num(*x)?, num(*y)?, num(*z)?))
}

fn main_inner(args: Args) -> Result<()> {
    println!("Kestrel Offboard Mission Simulator");
    println!("==================================\n");

    match &args.sweep_param {
        Some(name) => run_sweep(&args, name),
        None => run_single(&args),
    }
}

// ---------------------------------------------------------------------------
// Single Run
// ---------------------------------------------------------------------------
fn run_single(args: &Args) -> Result<()> {
    let mission = build_mission_config(args)?;
    let vehicle = build_vehicle_config(args);

    println!(
        "Flying {} waypoint(s) (delivery: {}, return home: {}, self-arm: {})",
        mission.waypoints.len(),
        mission.delivery_enabled,
        mission.return_home_enabled,
        mission.simulation_mode
    );

    let result = run_mission(&mission, &vehicle, args.max_ticks)?;
    print_mission_stats(&result);
    write_output(args, &result)?;

    if !result.report.completed {
        bail!(
            "mission stopped in {} after {} ticks",
            result.report.final_phase.label(),
            result.report.ticks
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Sweep Run
// ---------------------------------------------------------------------------
fn run_sweep(args: &Args, name: &str) -> Result<()> {
    let Some(spec) = sweep_spec(name) else {
        let known: Vec<&str> = SWEEPABLE
            .iter()
            .chain(VEHICLE_SWEEPABLE.iter())
            .map(|(n, _)| *n)
            .collect();
        bail!("unknown sweep parameter {name:?} (known: {})", known.join(", "));
    };

    let base_mission = build_mission_config(args)?;
    let base_vehicle = build_vehicle_config(args);
    println!(
        "Sweeping {} ({}) over [{}, {}] in {} steps",
        name, spec.label, spec.min, spec.max, args.sweep_steps
    );
    if let Some(current) = get_mission_param(&base_mission, name) {
        debug!(param = name, current, "base value");
    }

    let mut summary_rows = Vec::new();
    let values = spec.values(args.sweep_steps);
    for (i, val) in values.iter().copied().enumerate() {
        let mut mission = base_mission.clone();
        let mut vehicle = base_vehicle.clone();
        if !set_mission_param(&mut mission, name, val) {
            set_vehicle_param(&mut vehicle, name, val);
        }

        let res = run_mission(&mission, &vehicle, args.max_ticks)?;
        println!(
            "Run {}/{} | {}: {:.3} -> {} in {:.1} s",
            i + 1,
            values.len(),
            name,
            val,
            if res.report.completed { "landed" } else { "incomplete" },
            res.report.operation_time_s
        );

        summary_rows.push(SweepRow {
            value: val,
            completed: res.report.completed,
            ticks: res.report.ticks,
            operation_time_s: res.report.operation_time_s,
            fix_drift_m: res.report.fix_drift_m,
        });
    }

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let path = args.output_dir.join("sweep_summary.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;
    wtr.write_record([name, "completed", "ticks", "operation_time_s", "fix_drift_m"])?;
    for row in &summary_rows {
        wtr.write_record(&[
            format!("{:.4}", row.value),
            row.completed.to_string(),
            row.ticks.to_string(),
            format!("{:.2}", row.operation_time_s),
            row.fix_drift_m.map(|d| format!("{:.3}", d)).unwrap_or_default(),
        ])?;
    }
    wtr.flush()?;

    println!("\nSweep complete. Summary at {:?}", path);
    Ok(())
}

struct SweepRow {
    value: f64,
    completed: bool,
    ticks: u64,
    operation_time_s: f64,
    fix_drift_m: Option<f64>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read a mission file, or the defaults when none is given.
pub fn load_mission(path: Option<&Path>) -> Result<MissionConfig> {
    let Some(path) = path else {
        return Ok(MissionConfig::default());
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("parsing mission file {}", path.display()))?;
    info!(path = %path.display(), "mission file loaded");
    Ok(config)
}

fn build_mission_config(args: &Args) -> Result<MissionConfig> {
    let mut cfg = load_mission(args.mission.as_deref())?;

    if !args.waypoints.is_empty() {
        cfg.waypoints = args.waypoints.clone();
    }
    if let Some(v) = args.target_tolerance {
        cfg.target_tolerance = v;
    }
    if let Some(v) = args.cruise_speed {
        cfg.cruise_speed = v;
    }
    if let Some(v) = args.yaw_rate {
        cfg.yaw_rate = v;
    }
    if let Some(v) = args.takeoff_altitude {
        cfg.takeoff_altitude = v;
    }
    cfg.delivery_enabled |= args.delivery;
    cfg.return_home_enabled |= args.return_home;
    if args.operator_arm.is_some() {
        cfg.simulation_mode = false;
    }

    cfg.validate().context("invalid mission configuration")?;
    Ok(cfg)
}

fn build_vehicle_config(args: &Args) -> SimVehicleConfig {
    SimVehicleConfig {
        gps_noise_std: args.gps_noise,
        seed: args.seed,
        reject_first_commands: args.reject_commands,
        operator_arm_delay: args.operator_arm,
        ..Default::default()
    }
}

fn print_mission_stats(result: &MissionResult) {
    let report = &result.report;
    let max_alt = result
        .trace
        .position
        .iter()
        .map(|p| p.z)
        .fold(f64::NEG_INFINITY, f64::max);

    println!("\nMission Stats:");
    println!("  Completed:      {}", report.completed);
    println!("  Ticks:          {}", report.ticks);
    println!("  Operation Time: {:.1} s", report.operation_time_s);
    println!("  Waypoints:      {}", report.waypoints_reached);
    println!("  Max Altitude:   {:.2} m", max_alt);
    if let Some(drift) = report.fix_drift_m {
        println!("  Fix Drift:      {:.3} m", drift);
    }
    println!("-----------------------------");
}

/// One trace line as written to disk.
#[derive(Serialize)]
struct TraceRow {
    time: f64,
    phase: &'static str,
    waypoint: usize,
    pos_x: f64,
    pos_y: f64,
    pos_z: f64,
    yaw: f64,
    true_x: f64,
    true_y: f64,
    true_z: f64,
    sp_x: Option<f64>,
    sp_y: Option<f64>,
    sp_z: Option<f64>,
    sp_yaw: Option<f64>,
    holding: bool,
}

fn trace_rows(trace: &MissionTrace) -> Vec<TraceRow> {
    (0..trace.len())
        .map(|i| {
            let p = trace.position[i];
            let t = trace.true_position[i];
            let sp = trace.setpoint[i];
            TraceRow {
                time: trace.time[i],
                phase: trace.phase[i].label(),
                waypoint: trace.waypoint[i],
                pos_x: p.x,
                pos_y: p.y,
                pos_z: p.z,
                yaw: trace.yaw[i],
                true_x: t.x,
                true_y: t.y,
                true_z: t.z,
                sp_x: sp.map(|s| s.position.x),
                sp_y: sp.map(|s| s.position.y),
                sp_z: sp.map(|s| s.position.z),
                sp_yaw: sp.map(|s| s.yaw),
                holding: trace.holding[i],
            }
        })
        .collect()
}

fn write_output(args: &Args, result: &MissionResult) -> Result<()> {
    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    let rows = trace_rows(&result.trace);
    let trace_path = match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("mission_trace.csv");
            let mut wtr = csv::Writer::from_path(&path)
                .with_context(|| format!("opening {}", path.display()))?;
            for row in &rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
            path
        }
        OutputFormat::Json => {
            let path = args.output_dir.join("mission_trace.json");
            fs::write(&path, serde_json::to_string_pretty(&rows)?)
                .with_context(|| format!("writing {}", path.display()))?;
            path
        }
    };

    let summary_path = args.output_dir.join("mission_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&result.report)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!("Trace written to {:?}", trace_path);
    println!("Summary written to {:?}", summary_path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn run_in(dir: &TempDir, extra: &[&str]) -> Result<()> {
        let out = dir.path().to_str().unwrap().to_string();
        let mut argv = vec!["kestrel-cli", "--output-dir", out.as_str(), "--gps-noise", "0.1"];
        argv.extend_from_slice(extra);
        run_cli_main(&argv)
    }

    #[test]
    fn test_parse_waypoint() {
        assert_eq!(parse_waypoint("1, 2.5,-3").unwrap(), Waypoint::new(1.0, 2.5, -3.0));
        assert!(parse_waypoint("1,2").is_err());
        assert!(parse_waypoint("1,a,3").is_err());
    }

    #[test]
    fn test_single_run_writes_trace_and_summary() {
        let dir = TempDir::new().unwrap();
        run_in(&dir, &["--waypoint", "4,0,3", "--takeoff-altitude", "3"]).unwrap();

        let trace = fs::read_to_string(dir.path().join("mission_trace.csv")).unwrap();
        let header = trace.lines().next().unwrap();
        assert!(header.starts_with("time,phase,waypoint,pos_x"));
        assert!(trace.lines().count() > 100);

        let summary: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("mission_summary.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(summary["completed"], serde_json::Value::Bool(true));
        assert_eq!(summary["final_phase"], "Finished");
    }

    #[test]
    fn test_json_trace_format() {
        let dir = TempDir::new().unwrap();
        run_in(&dir, &["--waypoint", "3,0,3", "--takeoff-altitude", "3", "--format", "json"]).unwrap();
        let rows: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(dir.path().join("mission_trace.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(rows[0]["phase"], "AwaitConnection");
    }

    #[test]
    fn test_sweep_writes_one_row_per_step() {
        let dir = TempDir::new().unwrap();
        run_in(
            &dir,
            &[
                "--waypoint",
                "4,0,3",
                "--takeoff-altitude",
                "3",
                "--sweep-param",
                "cruise_speed",
                "--sweep-steps",
                "3",
            ],
        )
        .unwrap();

        let summary = fs::read_to_string(dir.path().join("sweep_summary.csv")).unwrap();
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("cruise_speed,completed"));
        assert!(lines[1..].iter().all(|l| l.contains(",true,")));
    }

    #[test]
    fn test_unknown_sweep_param() {
        let dir = TempDir::new().unwrap();
        let err = run_in(&dir, &["--sweep-param", "thrust"]).unwrap_err();
        assert!(err.to_string().contains("unknown sweep parameter"));
    }

    #[test]
    fn test_mission_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mission.json");
        fs::write(&path, r#"{ "waypoints": [{ "x": 2.0, "y": 2.0, "z": 4.0 }], "hover_time": 1.0 }"#)
            .unwrap();

        let cfg = load_mission(Some(&path)).unwrap();
        assert_eq!(cfg.waypoints, vec![Waypoint::new(2.0, 2.0, 4.0)]);
        assert_eq!(cfg.hover_time, 1.0);
        assert_eq!(cfg.calibration_samples, 100);

        assert!(load_mission(Some(&dir.path().join("missing.json"))).is_err());
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = run_in(&dir, &["--cruise-speed", "0"]).unwrap_err();
        assert!(format!("{err:#}").contains("cruise_speed"));
    }
}
