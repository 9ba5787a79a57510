//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Tick clock and history sizing.
    pub simulation: SimulationConfig,
    /// Client reconciliation and server input policy.
    pub reconciliation: ReconciliationConfig,
    /// Movement tuning shared by client prediction and server authority.
    pub movement: MovementConfig,
    /// Simulated network link used by the in-process transport.
    pub link: LinkConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Tick clock and history configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed simulation rate in ticks per second.
    pub tick_rate: u32,
    /// Number of slots in every history ring.
    pub ring_capacity: usize,
    /// Maximum ticks consumed in one frame. `None` disables the cap.
    pub max_catch_up: Option<u32>,
}

/// How the server orders inputs it drains from an entity's queue.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
pub enum InputOrdering {
    /// Apply every input in arrival order, even duplicates and late ones.
    ArrivalOrder,
    /// Drop inputs whose tick is not newer than the last one applied.
    #[default]
    StrictlyIncreasing,
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// Position error (world units) above which the client rewinds and replays.
    pub threshold: f32,
    /// Server-side input ordering policy.
    pub input_ordering: InputOrdering,
}

/// Movement tuning. Both sides must run with identical values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MovementConfig {
    /// Planar speed in units per second at full stick deflection.
    pub move_speed: f32,
    /// Vertical speed applied by a jump.
    pub jump_speed: f32,
    /// Downward acceleration in units per second squared.
    pub gravity: f32,
    /// Degrees of rotation per unit of look input.
    pub look_sensitivity_deg: f32,
    /// Lowest allowed pitch in degrees.
    pub pitch_min_deg: f32,
    /// Highest allowed pitch in degrees.
    pub pitch_max_deg: f32,
    /// Height of the flat ground plane.
    pub ground_height: f32,
}

/// Simulated link conditions for the in-process transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LinkConfig {
    /// Probability (0.0 - 1.0) that a packet is dropped.
    pub drop_rate: f64,
    /// Probability (0.0 - 1.0) that a packet is delivered twice.
    pub duplicate_rate: f64,
    /// Minimum delivery delay in link steps.
    pub min_latency_steps: u32,
    /// Maximum delivery delay in link steps. Unequal bounds reorder packets.
    pub max_latency_steps: u32,
    /// RNG seed so runs are reproducible.
    pub seed: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Also write JSON logs to a file in the config directory.
    pub json_log: bool,
}

// --- Default implementations ---

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_rate: 64,
            ring_capacity: 1024,
            max_catch_up: Some(8),
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            threshold: 10.0,
            input_ordering: InputOrdering::default(),
        }
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 6.0,
            jump_speed: 5.0,
            gravity: 19.6,
            look_sensitivity_deg: 1.0,
            pitch_min_deg: -50.0,
            pitch_max_deg: 70.0,
            ground_height: 0.0,
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            drop_rate: 0.0,
            duplicate_rate: 0.0,
            min_latency_steps: 2,
            max_latency_steps: 4,
            seed: 7,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_log: false,
        }
    }
}

// --- Validation ---

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn check_probability(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(invalid(field, format!("{value} is not a probability")));
    }
    Ok(())
}

impl Config {
    /// Checks every value the netcode relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_rate == 0 {
            return Err(invalid("simulation.tick_rate", "must be at least 1"));
        }
        if sim.ring_capacity == 0 {
            return Err(invalid("simulation.ring_capacity", "must be at least 1"));
        }
        if sim.max_catch_up == Some(0) {
            return Err(invalid(
                "simulation.max_catch_up",
                "0 would never tick; use None to disable the cap",
            ));
        }

        let threshold = self.reconciliation.threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(invalid(
                "reconciliation.threshold",
                format!("{threshold} is not a finite non-negative distance"),
            ));
        }

        let mv = &self.movement;
        let finite = [
            ("movement.move_speed", mv.move_speed),
            ("movement.jump_speed", mv.jump_speed),
            ("movement.gravity", mv.gravity),
            ("movement.look_sensitivity_deg", mv.look_sensitivity_deg),
            ("movement.pitch_min_deg", mv.pitch_min_deg),
            ("movement.pitch_max_deg", mv.pitch_max_deg),
            ("movement.ground_height", mv.ground_height),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(invalid(field, "must be finite"));
            }
        }
        // Yaw/pitch extraction folds pitch into (-90, 90) and locks at the poles.
        for (field, value) in [
            ("movement.pitch_min_deg", mv.pitch_min_deg),
            ("movement.pitch_max_deg", mv.pitch_max_deg),
        ] {
            if value.abs() >= 90.0 {
                return Err(invalid(field, format!("{value} is outside (-90, 90)")));
            }
        }
        if mv.pitch_min_deg > mv.pitch_max_deg {
            return Err(invalid(
                "movement.pitch_min_deg",
                format!("{} > pitch_max_deg {}", mv.pitch_min_deg, mv.pitch_max_deg),
            ));
        }

        check_probability("link.drop_rate", self.link.drop_rate)?;
        check_probability("link.duplicate_rate", self.link.duplicate_rate)?;
        if self.link.min_latency_steps > self.link.max_latency_steps {
            return Err(invalid(
                "link.min_latency_steps",
                "must not exceed max_latency_steps",
            ));
        }

        Ok(())
    }
}

// --- Load / Save ---

impl Config {
    /// Platform config directory for Rewind, if the platform has one.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("rewind"))
    }

    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }
}
