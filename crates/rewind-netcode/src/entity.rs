//! Networked entities and per-frame driving.
//!
//! A [`NetworkedEntity`] owns the pieces its role needs: a server (or host)
//! runs a [`ServerAuthority`], the owning client runs a [`ClientPredictor`]
//! and a [`Reconciler`]. One [`NetworkedEntity::tick`] call per frame
//! advances its clock and runs, for every tick consumed, the server step
//! followed by the client step.

use std::collections::BTreeMap;

use rewind_net::{
    Endpoint, EntityId, Envelope, InputPayload, Message, StatePayload, Tick, Transport,
};

use crate::authority::{InputSender, ServerAuthority};
use crate::clock::TickClock;
use crate::input::{InputSource, ScriptedInput};
use crate::movement::MovementSimulator;
use crate::prediction::ClientPredictor;
use crate::reconciliation::{ReconcileOutcome, Reconciler, RewindSource};
use crate::session::{ClientId, Role, Session};

/// Errors from managing a set of entities.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntityError {
    /// An entity with this id is already in the set.
    #[error("{0} is already spawned")]
    AlreadySpawned(EntityId),
}

// ---------------------------------------------------------------------------
// Host loopback
// ---------------------------------------------------------------------------

/// Transport for an entity that is both simulated and owned locally.
///
/// Inputs go straight into the local authority's queue. Broadcasts are taken
/// from the authority's tick result instead, so `send_state` does nothing.
struct HostLoopback<'a> {
    authority: Option<&'a ServerAuthority>,
}

impl Transport for HostLoopback<'_> {
    fn send_input(&self, _entity: EntityId, input: &InputPayload) {
        if let Some(authority) = self.authority {
            authority.enqueue(*input);
        }
    }

    fn send_state(&self, _entity: EntityId, _state: &StatePayload) {}
}

// ---------------------------------------------------------------------------
// NetworkedEntity
// ---------------------------------------------------------------------------

/// One replicated, player-controlled entity.
pub struct NetworkedEntity {
    id: EntityId,
    owner: ClientId,
    role: Role,
    clock: TickClock,
    simulator: MovementSimulator,
    authority: Option<ServerAuthority>,
    predictor: Option<ClientPredictor>,
    reconciler: Reconciler,
    input: Box<dyn InputSource>,
    remote_state: StatePayload,
    last_outcome: Option<ReconcileOutcome>,
}

impl NetworkedEntity {
    /// Creates the entity for `session` at `spawn`.
    ///
    /// The authority exists when the session is a server or host. The
    /// predictor exists only when the session owns the entity; `input` is
    /// what drives it (idle if `None`).
    pub fn spawn(
        session: &Session,
        id: EntityId,
        owner: ClientId,
        spawn: StatePayload,
        input: Option<Box<dyn InputSource>>,
    ) -> Self {
        let config = session.config();
        let capacity = config.simulation.ring_capacity;

        let authority = session.is_server().then(|| {
            ServerAuthority::new(id, capacity, spawn, config.reconciliation.input_ordering)
        });
        let predictor = session
            .owns(owner)
            .then(|| ClientPredictor::new(id, capacity, spawn));

        tracing::debug!(
            entity = %id,
            %owner,
            role = ?session.role(),
            authority = authority.is_some(),
            predicted = predictor.is_some(),
            "spawned"
        );

        Self {
            id,
            owner,
            role: session.role(),
            clock: TickClock::from_config(&config.simulation),
            simulator: session.movement_simulator(),
            authority,
            predictor,
            reconciler: Reconciler::new(config.reconciliation.threshold),
            input: input.unwrap_or_else(|| Box::new(ScriptedInput::idle())),
            remote_state: spawn,
            last_outcome: None,
        }
    }

    /// Advances the clock by `elapsed_secs` and runs every tick that became
    /// due. Returns the number of ticks run.
    pub fn tick(&mut self, elapsed_secs: f64, transport: &dyn Transport) -> usize {
        self.clock.advance(elapsed_secs);
        let mut ticks = 0;
        while self.clock.consume_tick() {
            self.run_tick(self.clock.tick(), transport);
            ticks += 1;
        }
        ticks
    }

    fn run_tick(&mut self, tick: Tick, transport: &dyn Transport) {
        let hosted = self.authority.is_some() && self.predictor.is_some();

        // Server step.
        if let Some(authority) = &mut self.authority {
            if hosted {
                let result =
                    authority.process_tick(&self.simulator, &HostLoopback { authority: None });
                if let Some(state) = result.broadcast {
                    self.reconciler.receive(state);
                }
            } else {
                authority.process_tick(&self.simulator, transport);
            }
        }

        // Client step: settle the newest authoritative state, then predict.
        let Some(predictor) = &mut self.predictor else {
            return;
        };
        if self.reconciler.has_pending() {
            let source = match &self.authority {
                Some(authority) => RewindSource::HostHistory(authority.states()),
                None => RewindSource::Authoritative,
            };
            let outcome = self
                .reconciler
                .reconcile(predictor, &self.simulator, tick, source);
            self.last_outcome = Some(outcome);
        }

        let sample = self.input.sample();
        if hosted {
            let loopback = HostLoopback {
                authority: self.authority.as_ref(),
            };
            predictor.predict_tick(tick, sample, &self.simulator, &loopback);
        } else {
            predictor.predict_tick(tick, sample, &self.simulator, transport);
        }
    }

    /// Hands an authoritative state received from the network to the entity.
    ///
    /// The owner reconciles it on its next tick; any other client just
    /// displays it.
    pub fn receive_state(&mut self, state: StatePayload) {
        if self.predictor.is_some() {
            self.reconciler.receive(state);
        } else if state.tick >= self.remote_state.tick {
            self.remote_state = state;
        }
    }

    /// Queues an input received from the network. Returns `false` if this
    /// process is not authoritative for the entity.
    pub fn deliver_input(&mut self, input: InputPayload) -> bool {
        match &self.authority {
            Some(authority) => {
                authority.enqueue(input);
                true
            }
            None => false,
        }
    }

    /// A handle for feeding inputs from another thread.
    pub fn input_sender(&self) -> Option<InputSender> {
        self.authority.as_ref().map(ServerAuthority::input_sender)
    }

    /// The state to present: the prediction when owned, the authoritative
    /// state on a server, the last received state otherwise.
    pub fn transform(&self) -> &StatePayload {
        if let Some(predictor) = &self.predictor {
            predictor.current()
        } else if let Some(authority) = &self.authority {
            authority.current()
        } else {
            &self.remote_state
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner(&self) -> ClientId {
        self.owner
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn clock(&self) -> &TickClock {
        &self.clock
    }

    pub fn simulator(&self) -> &MovementSimulator {
        &self.simulator
    }

    pub fn predictor(&self) -> Option<&ClientPredictor> {
        self.predictor.as_ref()
    }

    pub fn authority(&self) -> Option<&ServerAuthority> {
        self.authority.as_ref()
    }

    /// Mutable authority, for gameplay code that overrides state.
    pub fn authority_mut(&mut self) -> Option<&mut ServerAuthority> {
        self.authority.as_mut()
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// Outcome of the most recent reconcile attempt.
    pub fn last_outcome(&self) -> Option<ReconcileOutcome> {
        self.last_outcome
    }
}

// ---------------------------------------------------------------------------
// EntitySet
// ---------------------------------------------------------------------------

/// All entities known to one process, with message routing.
#[derive(Default)]
pub struct EntitySet {
    entities: BTreeMap<EntityId, NetworkedEntity>,
}

impl EntitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entity`. Fails if its id is taken.
    pub fn insert(&mut self, entity: NetworkedEntity) -> Result<(), EntityError> {
        let id = entity.id();
        if self.entities.contains_key(&id) {
            return Err(EntityError::AlreadySpawned(id));
        }
        self.entities.insert(id, entity);
        Ok(())
    }

    pub fn remove(&mut self, id: EntityId) -> Option<NetworkedEntity> {
        self.entities.remove(&id)
    }

    /// Routes one decoded message to its entity. Returns `false` if the
    /// entity is unknown or cannot take the message.
    pub fn deliver(&mut self, envelope: Envelope) -> bool {
        let Some(entity) = self.entities.get_mut(&envelope.entity) else {
            tracing::trace!(entity = %envelope.entity, "message for unknown entity");
            return false;
        };
        match envelope.message {
            Message::InputSubmit(input) => entity.deliver_input(input),
            Message::StateBroadcast(state) => {
                entity.receive_state(state);
                true
            }
        }
    }

    /// Polls `endpoint` and delivers everything that arrived. Returns the
    /// number of messages routed.
    pub fn pump(&mut self, endpoint: &mut Endpoint) -> usize {
        let mut delivered = 0;
        for envelope in endpoint.poll() {
            if self.deliver(envelope) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Ticks every entity. Returns the total number of ticks run.
    pub fn tick(&mut self, elapsed_secs: f64, transport: &dyn Transport) -> usize {
        self.entities
            .values_mut()
            .map(|entity| entity.tick(elapsed_secs, transport))
            .sum()
    }

    pub fn get(&self, id: EntityId) -> Option<&NetworkedEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut NetworkedEntity> {
        self.entities.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NetworkedEntity> {
        self.entities.values()
    }
}

#[cfg(test)]
#[path = "entity_tests.rs"]
mod tests;
