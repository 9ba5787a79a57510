//! The local process's place in a networked session.

use rewind_config::{Config, ConfigError};

use crate::movement::MovementSimulator;

/// Identifies a connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// Which side of the protocol this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Dedicated server: authority only.
    Server,
    /// Remote client: predicts and reconciles its own entities.
    Client,
    /// Server and a local client in one process.
    Host,
}

/// Role, local identity and configuration shared by every entity.
///
/// The configuration is validated once here and then treated as fixed for
/// the lifetime of the session.
#[derive(Debug, Clone)]
pub struct Session {
    role: Role,
    local_client: Option<ClientId>,
    config: Config,
}

impl Session {
    /// Dedicated server session.
    pub fn server(config: Config) -> Result<Self, ConfigError> {
        Self::new(Role::Server, None, config)
    }

    /// Remote client session for `local`.
    pub fn client(local: ClientId, config: Config) -> Result<Self, ConfigError> {
        Self::new(Role::Client, Some(local), config)
    }

    /// Host session; `local` is the host's own player.
    pub fn host(local: ClientId, config: Config) -> Result<Self, ConfigError> {
        Self::new(Role::Host, Some(local), config)
    }

    fn new(role: Role, local_client: Option<ClientId>, config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        tracing::info!(
            ?role,
            local_client = ?local_client.map(|c| c.0),
            tick_rate = config.simulation.tick_rate,
            threshold = config.reconciliation.threshold,
            "session created"
        );
        Ok(Self {
            role,
            local_client,
            config,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn local_client(&self) -> Option<ClientId> {
        self.local_client
    }

    /// Runs authoritative simulation.
    pub fn is_server(&self) -> bool {
        matches!(self.role, Role::Server | Role::Host)
    }

    /// Has a local player.
    pub fn is_client(&self) -> bool {
        matches!(self.role, Role::Client | Role::Host)
    }

    /// `true` if an entity owned by `owner` is driven by local input.
    pub fn owns(&self, owner: ClientId) -> bool {
        self.is_client() && self.local_client == Some(owner)
    }

    /// Simulator configured for this session.
    pub fn movement_simulator(&self) -> MovementSimulator {
        MovementSimulator::from_config(&self.config)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
