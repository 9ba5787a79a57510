//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::{Config, InputOrdering};

/// Rewind command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "rewind", about = "Client prediction and server reconciliation")]
pub struct CliArgs {
    /// Simulation tick rate (ticks per second).
    #[arg(long)]
    pub tick_rate: Option<u32>,

    /// History ring capacity in ticks.
    #[arg(long)]
    pub ring_capacity: Option<usize>,

    /// Reconciliation distance threshold.
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Server input ordering policy.
    #[arg(long, value_enum)]
    pub input_ordering: Option<InputOrdering>,

    /// Simulated packet drop probability.
    #[arg(long)]
    pub drop_rate: Option<f64>,

    /// Simulated packet duplication probability.
    #[arg(long)]
    pub duplicate_rate: Option<f64>,

    /// Seed for the simulated link.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(rate) = args.tick_rate {
            self.simulation.tick_rate = rate;
        }
        if let Some(capacity) = args.ring_capacity {
            self.simulation.ring_capacity = capacity;
        }
        if let Some(threshold) = args.threshold {
            self.reconciliation.threshold = threshold;
        }
        if let Some(ordering) = args.input_ordering {
            self.reconciliation.input_ordering = ordering;
        }
        if let Some(rate) = args.drop_rate {
            self.link.drop_rate = rate;
        }
        if let Some(rate) = args.duplicate_rate {
            self.link.duplicate_rate = rate;
        }
        if let Some(seed) = args.seed {
            self.link.seed = seed;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}
