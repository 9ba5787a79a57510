//! Network message types and serialization.
//!
//! Two payloads cross the wire: [`InputPayload`] (client → server) and
//! [`StatePayload`] (server → owning client). Each travels inside an
//! [`Envelope`] addressed to one entity, serialized with [`postcard`] and
//! prefixed with a protocol version byte.
//!
//! Field order in both payloads is part of the wire format. Postcard writes
//! fields in declaration order, `f32` as four little-endian bytes and `bool`
//! as one byte, so reordering a field breaks compatibility.

use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Current wire-protocol version. Prepended to every serialized envelope.
pub const PROTOCOL_VERSION: u8 = 1;

/// One fixed-duration simulation step.
///
/// 32 bits is ~777 days at 64 Hz, so a session never wraps.
pub type Tick = u32;

/// Identifies a networked entity within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity#{}", self.0)
    }
}

/// Payloads that carry the tick they were produced for.
pub trait TickStamped {
    /// The tick embedded in the payload.
    fn tick(&self) -> Tick;
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// One tick of player input, produced by the owning client.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputPayload {
    /// Tick this input was sampled for.
    pub tick: Tick,
    /// Local-space movement: `x` strafes right, `z` moves forward.
    pub move_vector: Vec3,
    /// Look delta: `x` is yaw, `y` is pitch, in look-input units.
    pub look_vector: Vec2,
    /// Jump button held.
    pub jump_requested: bool,
    /// Fire button held. Carried for the weapon layer; movement ignores it.
    pub fire_requested: bool,
}

impl InputPayload {
    /// An input with no movement, look or buttons.
    pub fn idle(tick: Tick) -> Self {
        Self {
            tick,
            move_vector: Vec3::ZERO,
            look_vector: Vec2::ZERO,
            jump_requested: false,
            fire_requested: false,
        }
    }

    /// `true` if every vector component is finite.
    pub fn is_finite(&self) -> bool {
        self.move_vector.is_finite() && self.look_vector.is_finite()
    }
}

impl TickStamped for InputPayload {
    fn tick(&self) -> Tick {
        self.tick
    }
}

/// Physical state of an entity after a tick was simulated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatePayload {
    /// Tick whose input produced this state.
    pub tick: Tick,
    /// World-space position.
    pub position: Vec3,
    /// Orientation (yaw about +Y, then pitch about local +X).
    pub orientation: Quat,
    /// Linear velocity in units per second.
    pub linear_velocity: Vec3,
    /// Angular velocity in radians per second.
    pub angular_velocity: Vec3,
}

impl StatePayload {
    /// A motionless, unrotated state at `position`.
    pub fn at_rest(tick: Tick, position: Vec3) -> Self {
        Self {
            tick,
            position,
            orientation: Quat::IDENTITY,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }

    /// `true` if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.orientation.is_finite()
            && self.linear_velocity.is_finite()
            && self.angular_velocity.is_finite()
    }

    /// Euclidean distance between the two positions.
    pub fn position_error(&self, other: &StatePayload) -> f32 {
        self.position.distance(other.position)
    }
}

impl TickStamped for StatePayload {
    fn tick(&self) -> Tick {
        self.tick
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Top-level network message. The enum discriminant is the type tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Client submits one tick of input for its entity.
    InputSubmit(InputPayload),
    /// Server sends the latest authoritative state to the owning client.
    StateBroadcast(StatePayload),
}

/// A message addressed to one entity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Entity the message is about.
    pub entity: EntityId,
    /// The message itself.
    pub message: Message,
}

impl Envelope {
    /// `true` if the carried payload has only finite components.
    pub fn is_finite(&self) -> bool {
        match &self.message {
            Message::InputSubmit(input) => input.is_finite(),
            Message::StateBroadcast(state) => state.is_finite(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during envelope deserialization.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// The payload was empty (no version byte).
    #[error("empty payload, no version byte")]
    EmptyPayload,

    /// The version byte does not match [`PROTOCOL_VERSION`].
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Postcard deserialization failed.
    #[error("deserialization error: {0}")]
    Postcard(#[from] postcard::Error),

    /// A vector component was NaN or infinite.
    #[error("non-finite payload for {0}")]
    NonFinite(EntityId),
}

// ---------------------------------------------------------------------------
// Serialization helpers
// ---------------------------------------------------------------------------

/// Serialize an [`Envelope`] into a versioned binary payload.
///
/// Wire format: `[version: u8] [postcard-encoded Envelope]`
pub fn serialize_envelope(envelope: &Envelope) -> Result<Vec<u8>, postcard::Error> {
    let body = postcard::to_allocvec(envelope)?;
    let mut out = Vec::with_capacity(1 + body.len());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Deserialize a versioned binary payload into an [`Envelope`].
///
/// This is the validation boundary: payloads with NaN or infinite components
/// are rejected here so they never reach the simulation.
pub fn deserialize_envelope(data: &[u8]) -> Result<Envelope, MessageError> {
    let Some((&version, body)) = data.split_first() else {
        return Err(MessageError::EmptyPayload);
    };
    if version != PROTOCOL_VERSION {
        return Err(MessageError::UnsupportedVersion(version));
    }

    let envelope: Envelope = postcard::from_bytes(body)?;
    if !envelope.is_finite() {
        return Err(MessageError::NonFinite(envelope.entity));
    }
    Ok(envelope)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
