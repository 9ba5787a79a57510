//! Server-authoritative processing of submitted inputs.
//!
//! Inputs reach the server asynchronously. Network delivery pushes them onto
//! a per-entity lock-free queue through an [`InputSender`]; once per server
//! tick [`ServerAuthority::process_tick`] drains the queue, simulates each
//! input against the authoritative state and sends the newest result back
//! to the owning client.

use crossbeam_channel::{Receiver, Sender, unbounded};
use rewind_config::InputOrdering;
use rewind_net::{EntityId, InputPayload, StatePayload, Tick, Transport};

use crate::history::HistoryRing;
use crate::movement::MovementSimulator;

// ---------------------------------------------------------------------------
// InputSender
// ---------------------------------------------------------------------------

/// Cloneable handle that feeds one entity's input queue.
///
/// Safe to use from the thread that receives network traffic while the
/// simulation thread owns the [`ServerAuthority`].
#[derive(Debug, Clone)]
pub struct InputSender {
    entity: EntityId,
    tx: Sender<InputPayload>,
}

impl InputSender {
    /// Appends `input` to the queue. Returns `false` if the authority has
    /// been dropped.
    pub fn enqueue(&self, input: InputPayload) -> bool {
        self.tx.send(input).is_ok()
    }

    /// The entity whose queue this feeds.
    pub fn entity(&self) -> EntityId {
        self.entity
    }
}

// ---------------------------------------------------------------------------
// Results and counters
// ---------------------------------------------------------------------------

/// What one call to [`ServerAuthority::process_tick`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AuthorityTick {
    /// Inputs simulated.
    pub applied: usize,
    /// Inputs discarded by the ordering policy.
    pub rejected: usize,
    /// State sent to the owner, if any input was applied.
    pub broadcast: Option<StatePayload>,
}

/// Running totals for a [`ServerAuthority`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthorityStats {
    pub applied: u64,
    pub rejected_stale: u64,
    pub broadcasts: u64,
    pub overrides: u64,
}

// ---------------------------------------------------------------------------
// ServerAuthority
// ---------------------------------------------------------------------------

/// Authoritative simulation of one entity.
#[derive(Debug)]
pub struct ServerAuthority {
    entity: EntityId,
    tx: Sender<InputPayload>,
    rx: Receiver<InputPayload>,
    states: HistoryRing<StatePayload>,
    current: StatePayload,
    last_processed: Option<Tick>,
    ordering: InputOrdering,
    stats: AuthorityStats,
}

impl ServerAuthority {
    /// Creates the authority with `spawn` as its first recorded state.
    pub fn new(
        entity: EntityId,
        capacity: usize,
        spawn: StatePayload,
        ordering: InputOrdering,
    ) -> Self {
        let (tx, rx) = unbounded();
        let mut states = HistoryRing::new(capacity);
        states.add(spawn, spawn.tick);
        Self {
            entity,
            tx,
            rx,
            states,
            current: spawn,
            last_processed: None,
            ordering,
            stats: AuthorityStats::default(),
        }
    }

    /// A handle for pushing inputs from elsewhere.
    pub fn input_sender(&self) -> InputSender {
        InputSender {
            entity: self.entity,
            tx: self.tx.clone(),
        }
    }

    /// Appends `input` to the queue.
    pub fn enqueue(&self, input: InputPayload) {
        // The authority holds its own receiver, so the channel cannot be closed.
        let _ = self.tx.send(input);
    }

    /// Number of inputs waiting for the next tick.
    pub fn queued(&self) -> usize {
        self.rx.len()
    }

    /// Drains the queue and simulates every accepted input in queue order.
    ///
    /// Only the inputs present when the call starts are processed; anything
    /// pushed concurrently waits for the next tick.
    pub fn process_tick(
        &mut self,
        simulator: &MovementSimulator,
        transport: &dyn Transport,
    ) -> AuthorityTick {
        let mut result = AuthorityTick::default();
        let pending = self.rx.len();

        for input in self.rx.try_iter().take(pending) {
            if self.ordering == InputOrdering::StrictlyIncreasing
                && self.last_processed.is_some_and(|last| input.tick <= last)
            {
                result.rejected += 1;
                tracing::debug!(
                    entity = %self.entity,
                    tick = input.tick,
                    last = ?self.last_processed,
                    "rejecting stale input"
                );
                continue;
            }

            let next = simulator.simulate(&self.current, &input);
            self.states.add(next, input.tick);
            self.current = next;
            self.last_processed = Some(input.tick);
            result.applied += 1;
        }

        if result.applied > 0 {
            transport.send_state(self.entity, &self.current);
            result.broadcast = Some(self.current);
            self.stats.broadcasts += 1;
        }
        self.stats.applied += result.applied as u64;
        self.stats.rejected_stale += result.rejected as u64;
        result
    }

    /// Replaces the authoritative state from outside the input stream
    /// (spawn placement, knockback, teleport).
    ///
    /// The state is recorded at its own tick and reaches the owner with the
    /// next broadcast.
    pub fn override_state(&mut self, state: StatePayload) {
        tracing::debug!(
            entity = %self.entity,
            tick = state.tick,
            position = ?state.position,
            "authoritative state overridden"
        );
        self.states.add(state, state.tick);
        self.current = state;
        self.stats.overrides += 1;
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Latest authoritative state.
    pub fn current(&self) -> &StatePayload {
        &self.current
    }

    /// Authoritative states, indexed by tick.
    pub fn states(&self) -> &HistoryRing<StatePayload> {
        &self.states
    }

    /// Tick of the most recently applied input.
    pub fn last_processed(&self) -> Option<Tick> {
        self.last_processed
    }

    pub fn ordering(&self) -> InputOrdering {
        self.ordering
    }

    pub fn stats(&self) -> AuthorityStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use glam::Vec3;
    use rewind_config::MovementConfig;

    use super::*;

    #[derive(Default)]
    struct RecordingTransport {
        states: RefCell<Vec<StatePayload>>,
    }

    impl Transport for RecordingTransport {
        fn send_input(&self, _entity: EntityId, _input: &InputPayload) {}

        fn send_state(&self, _entity: EntityId, state: &StatePayload) {
            self.states.borrow_mut().push(*state);
        }
    }

    fn sim() -> MovementSimulator {
        MovementSimulator::new(&MovementConfig::default(), 64)
    }

    fn forward(tick: Tick) -> InputPayload {
        InputPayload {
            move_vector: Vec3::Z,
            ..InputPayload::idle(tick)
        }
    }

    fn authority(ordering: InputOrdering) -> ServerAuthority {
        ServerAuthority::new(
            EntityId(1),
            64,
            StatePayload::at_rest(0, Vec3::ZERO),
            ordering,
        )
    }

    #[test]
    fn test_empty_queue_sends_nothing() {
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::default());
        let result = authority.process_tick(&sim(), &transport);
        assert_eq!(result, AuthorityTick::default());
        assert!(transport.states.borrow().is_empty());
    }

    #[test]
    fn test_drains_queue_and_broadcasts_latest() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::default());
        for tick in 1..=3 {
            authority.enqueue(forward(tick));
        }

        let result = authority.process_tick(&sim, &transport);

        assert_eq!(result.applied, 3);
        assert_eq!(authority.queued(), 0);
        let sent = transport.states.borrow();
        assert_eq!(sent.len(), 1, "one broadcast per tick, not per input");
        assert_eq!(sent[0].tick, 3);
        assert_eq!(result.broadcast, Some(sent[0]));
        for tick in 1..=3 {
            assert!(authority.states().get_exact(tick).is_some());
        }
    }

    #[test]
    fn test_matches_client_simulation() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::default());
        let mut expected = *authority.current();
        for tick in 1..=5 {
            expected = sim.simulate(&expected, &forward(tick));
            authority.enqueue(forward(tick));
        }
        authority.process_tick(&sim, &transport);
        assert_eq!(authority.current(), &expected);
    }

    #[test]
    fn test_strict_ordering_rejects_stale_and_duplicate() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::StrictlyIncreasing);
        authority.enqueue(forward(5));
        authority.enqueue(forward(5));
        authority.enqueue(forward(3));
        authority.enqueue(forward(6));

        let result = authority.process_tick(&sim, &transport);

        assert_eq!(result.applied, 2);
        assert_eq!(result.rejected, 2);
        assert_eq!(authority.last_processed(), Some(6));
        assert_eq!(authority.stats().rejected_stale, 2);
    }

    #[test]
    fn test_arrival_order_applies_everything() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::ArrivalOrder);
        authority.enqueue(forward(5));
        authority.enqueue(forward(3));

        let result = authority.process_tick(&sim, &transport);

        assert_eq!(result.applied, 2);
        assert_eq!(result.rejected, 0);
        assert_eq!(authority.current().tick, 3);
    }

    #[test]
    fn test_arrival_order_lets_late_input_follow_a_broadcast() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::ArrivalOrder);

        authority.enqueue(forward(5));
        let newer = authority.process_tick(&sim, &transport).broadcast.expect("broadcast");
        assert_eq!(newer.tick, 5);

        authority.enqueue(forward(3));
        let late = authority.process_tick(&sim, &transport).broadcast.expect("broadcast");

        // Tick 3 is simulated on top of tick 5 and broadcast after it.
        assert_eq!(late.tick, 3);
        assert_eq!(late, sim.simulate(&newer, &forward(3)));
        assert!(late.position.z < newer.position.z);
        assert_eq!(authority.states().get_exact(3), Some(&late));
        assert_eq!(authority.states().get_exact(5), Some(&newer));
        assert_eq!(authority.last_processed(), Some(3));

        let sent: Vec<Tick> = transport.states.borrow().iter().map(|s| s.tick).collect();
        assert_eq!(sent, vec![5, 3]);
    }

    #[test]
    fn test_sender_feeds_queue_from_another_thread() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::default());
        let sender = authority.input_sender();
        assert_eq!(sender.entity(), EntityId(1));

        std::thread::spawn(move || {
            for tick in 1..=10 {
                assert!(sender.enqueue(forward(tick)));
            }
        })
        .join()
        .expect("sender thread panicked");

        let result = authority.process_tick(&sim, &transport);
        assert_eq!(result.applied, 10);
        assert_eq!(authority.stats().applied, 10);
    }

    #[test]
    fn test_sender_reports_dropped_authority() {
        let sender = authority(InputOrdering::default()).input_sender();
        assert!(!sender.enqueue(forward(1)));
    }

    #[test]
    fn test_override_is_simulated_from() {
        let sim = sim();
        let transport = RecordingTransport::default();
        let mut authority = authority(InputOrdering::default());
        let mut knocked = *authority.current();
        knocked.position = Vec3::new(3.0, 0.0, 0.0);
        authority.override_state(knocked);

        authority.enqueue(InputPayload::idle(1));
        authority.process_tick(&sim, &transport);

        assert_eq!(authority.current().position, Vec3::new(3.0, 0.0, 0.0));
        assert_eq!(authority.stats().overrides, 1);
    }
}
