//! Configuration for the Rewind netcode core.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line. Everything here is read once when a session is built; the
//! netcode never picks up changes mid-session.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    Config, DebugConfig, InputOrdering, LinkConfig, MovementConfig, ReconciliationConfig,
    SimulationConfig,
};
pub use error::ConfigError;
