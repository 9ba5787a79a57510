//! Client-side prediction and server reconciliation for tick-synchronized
//! movement.
//!
//! The owning client simulates its entity immediately ([`ClientPredictor`]),
//! the server stays authoritative ([`ServerAuthority`]), and the client
//! rewinds and replays when the server disagrees ([`Reconciler`]). Both sides
//! share one [`MovementSimulator`] and step on a fixed-rate [`TickClock`];
//! history is kept in tick-indexed [`HistoryRing`]s. [`NetworkedEntity`]
//! ties the pieces together behind a single `tick(elapsed)` call.

pub mod authority;
pub mod clock;
pub mod entity;
pub mod history;
pub mod input;
pub mod movement;
pub mod prediction;
pub mod reconciliation;
pub mod session;

pub use authority::{AuthorityStats, AuthorityTick, InputSender, ServerAuthority};
pub use clock::TickClock;
pub use entity::{EntityError, EntitySet, NetworkedEntity};
pub use history::HistoryRing;
pub use input::{InputSample, InputSource, ScriptedInput};
pub use movement::MovementSimulator;
pub use prediction::ClientPredictor;
pub use reconciliation::{
    ReconcileOutcome, ReconcileStats, Reconciler, RewindSource, rewind_and_replay,
};
pub use session::{ClientId, Role, Session};
