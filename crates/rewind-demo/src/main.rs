//! Demo binary that runs a simulated play session and reports how often the
//! client had to be corrected.
//!
//! Configuration is loaded from `config.ron` and can be overridden via CLI flags.
//! Run with `cargo run -p rewind-demo` for a dedicated server and one client.
//! Run with `cargo run -p rewind-demo -- --host --drop-rate 0.1` for a lossy host session.

mod scenario;

use std::path::PathBuf;

use clap::Parser;
use rewind_config::{CliArgs, Config};
use scenario::ScenarioOptions;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "rewind-demo", about = "Simulated prediction and reconciliation session")]
struct DemoArgs {
    #[command(flatten)]
    common: CliArgs,

    /// Simulated seconds to run.
    #[arg(long, default_value_t = 20.0)]
    seconds: f64,

    /// Run a single host instead of a dedicated server and a client.
    #[arg(long)]
    host: bool,

    /// Seconds between server-side knockbacks (0 disables them).
    #[arg(long, default_value_t = 2.0)]
    knockback_every: f64,

    /// Knockback distance in world units; above the threshold it forces a correction.
    #[arg(long, default_value_t = 12.0)]
    knockback_strength: f32,

    /// Seed for frame-time jitter and knockback direction.
    #[arg(long, default_value_t = 42)]
    frame_seed: u64,
}

fn main() {
    let args = DemoArgs::parse();

    // Resolve config directory
    let config_dir = args
        .common
        .config
        .clone()
        .or_else(Config::default_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    // Load or create config, then apply CLI overrides
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args.common);
    if let Err(e) = config.validate() {
        eprintln!("Invalid config: {e}, using defaults");
        config = Config::default();
    }

    let log_dir = config_dir.join("logs");
    rewind_log::init_logging(Some(&log_dir), Some(&config));

    let options = ScenarioOptions {
        seconds: args.seconds,
        knockback_every_secs: args.knockback_every,
        knockback_strength: args.knockback_strength,
        frame_seed: args.frame_seed,
    };
    info!(
        host = args.host,
        seconds = options.seconds,
        tick_rate = config.simulation.tick_rate,
        threshold = config.reconciliation.threshold,
        drop_rate = config.link.drop_rate,
        "starting session"
    );

    let result = if args.host {
        scenario::run_host(&config, &options)
    } else {
        scenario::run_dedicated(&config, &options)
    };
    match result {
        Ok(report) => report.log(),
        Err(e) => error!("session failed: {e}"),
    }
}
