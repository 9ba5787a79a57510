//! Wire messages and the transport seam between client and server.
//!
//! The netcode core never touches a socket. It talks to a [`Transport`]
//! (`send_input` / `send_state`) and drains decoded [`Envelope`]s from an
//! [`Endpoint`]. The in-process endpoint can run over a [`LinkConditioner`]
//! that drops, duplicates and reorders packets like a real network would.

pub mod link;
pub mod messages;
pub mod transport;

pub use link::{LinkConditioner, LinkStats};
pub use messages::{
    EntityId, Envelope, InputPayload, Message, MessageError, PROTOCOL_VERSION, StatePayload,
    Tick, TickStamped, deserialize_envelope, serialize_envelope,
};
pub use transport::{Endpoint, EndpointStats, Transport};
