//! Kestrel - Autonomous multi-waypoint offboard mission controller

mod live;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "kestrel")]
#[command(about = "Autonomous multi-waypoint offboard mission controller")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run CLI batch/single simulation mode
    Cli {
        /// Pass remaining arguments to kestrel-cli
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Fly a mission in real time against the simulated vehicle
    Live {
        /// Mission file (JSON)
        #[arg(short, long)]
        mission: Option<PathBuf>,

        /// Simulated seconds per wall-clock second
        #[arg(short, long, default_value_t = 1.0)]
        speed: f64,

        /// Physics steps per control tick
        #[arg(long, default_value_t = 5)]
        physics_ratio: u32,

        /// Abort after this many simulated seconds
        #[arg(long, default_value_t = 600.0)]
        timeout: f64,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Cli { args }) => {
            // Pass through to kestrel-cli
            let cli_args: Vec<&str> = args.iter().map(|s| s.as_str()).collect();
            run_cli(&cli_args)
        }
        Some(Commands::Live {
            mission,
            speed,
            physics_ratio,
            timeout,
            seed,
        }) => live::run_live(live::LiveOptions {
            mission,
            speed,
            physics_ratio,
            timeout,
            seed,
        }),
        None => {
            // Default to a real-time run of the default mission
            live::run_live(live::LiveOptions::default())
        }
    }
}

fn run_cli(args: &[&str]) -> anyhow::Result<()> {
    let mut full_args = vec!["kestrel-cli"];
    full_args.extend(args);

    match kestrel_cli::run_cli_main(&full_args) {
        Ok(_) => Ok(()),
        Err(e) => {
            eprintln!("CLI error: {:#}", e);
            std::process::exit(1);
        }
    }
}
