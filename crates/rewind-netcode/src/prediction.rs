//! Client-side prediction of the locally owned entity.
//!
//! Every tick the predictor stamps the local input, buffers it, sends it to
//! the server and applies it immediately. Both the inputs and the resulting
//! states are kept in tick-indexed rings so a later correction can rewind to
//! any recent tick and replay forward.

use rewind_net::{EntityId, InputPayload, StatePayload, Tick, Transport};

use crate::history::HistoryRing;
use crate::input::InputSample;
use crate::movement::MovementSimulator;

/// Prediction state for one owned entity.
#[derive(Debug, Clone)]
pub struct ClientPredictor {
    entity: EntityId,
    inputs: HistoryRing<InputPayload>,
    states: HistoryRing<StatePayload>,
    current: StatePayload,
    last_predicted: Option<Tick>,
}

impl ClientPredictor {
    /// Creates a predictor whose live state starts at `spawn`.
    ///
    /// `spawn` is also recorded in the state ring at its own tick, so a
    /// correction for that tick has something to compare against.
    pub fn new(entity: EntityId, capacity: usize, spawn: StatePayload) -> Self {
        let mut states = HistoryRing::new(capacity);
        states.add(spawn, spawn.tick);
        Self {
            entity,
            inputs: HistoryRing::new(capacity),
            states,
            current: spawn,
            last_predicted: None,
        }
    }

    /// Predicts `tick` from the live state.
    ///
    /// The input is sent before it is simulated; a send never fails from the
    /// predictor's point of view.
    pub fn predict_tick(
        &mut self,
        tick: Tick,
        sample: InputSample,
        simulator: &MovementSimulator,
        transport: &dyn Transport,
    ) -> StatePayload {
        let input = sample.stamp(tick);
        self.inputs.add(input, tick);
        transport.send_input(self.entity, &input);

        let next = simulator.simulate(&self.current, &input);
        self.states.add(next, tick);
        self.current = next;
        self.last_predicted = Some(tick);

        tracing::trace!(entity = %self.entity, tick, position = ?next.position, "predicted");
        next
    }

    /// Replaces the live state and records it at its own tick. Used both for
    /// the rewind snap and for every replayed tick.
    pub(crate) fn snap(&mut self, state: StatePayload) {
        self.states.add(state, state.tick);
        self.current = state;
    }

    /// The entity this predictor drives.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Live predicted state.
    pub fn current(&self) -> &StatePayload {
        &self.current
    }

    /// Buffered inputs, indexed by tick.
    pub fn inputs(&self) -> &HistoryRing<InputPayload> {
        &self.inputs
    }

    /// Predicted states, indexed by tick.
    pub fn states(&self) -> &HistoryRing<StatePayload> {
        &self.states
    }

    /// Most recent tick predicted, if any.
    pub fn last_predicted(&self) -> Option<Tick> {
        self.last_predicted
    }
}
