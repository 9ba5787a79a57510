//! Reconciling client prediction with authoritative server state.
//!
//! When an authoritative state for tick `T` arrives, the client compares it
//! with its own prediction for `T`. A position error above the threshold
//! means the prediction went wrong somewhere at or before `T`: the client
//! snaps to a known-good state and re-simulates every buffered input after
//! it, which rebuilds the present from corrected history.

use rewind_net::{InputPayload, StatePayload, Tick};

use crate::history::HistoryRing;
use crate::movement::MovementSimulator;
use crate::prediction::ClientPredictor;

// ---------------------------------------------------------------------------
// RewindSource
// ---------------------------------------------------------------------------

/// Where the state to rewind to comes from.
#[derive(Debug, Clone, Copy)]
pub enum RewindSource<'a> {
    /// Rewind to the received authoritative state at `T` and replay from
    /// `T + 1`. Used by a pure client.
    Authoritative,
    /// Rewind to the server's own recorded state at `T - 1` and replay from
    /// `T`. Used by a host, which holds the authoritative history locally.
    HostHistory(&'a HistoryRing<StatePayload>),
}

// ---------------------------------------------------------------------------
// Outcome and counters
// ---------------------------------------------------------------------------

/// Result of one [`Reconciler::reconcile`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    /// Nothing was received since the last call.
    NoUpdate,
    /// Same state as the one reconciled last time.
    Duplicate,
    /// Older than the state reconciled last time.
    Stale,
    /// No prediction is recorded for the state's tick.
    MissingPrediction { tick: Tick },
    /// The host's history has no state for the tick before `tick`.
    NoPredecessor { tick: Tick },
    /// Replaying would need inputs the ring has already overwritten.
    WindowExceeded { tick: Tick, window: u32 },
    /// Prediction was within the threshold; nothing changed.
    Accepted { tick: Tick, error: f32 },
    /// Prediction was corrected and `replayed` ticks were re-simulated.
    Corrected { tick: Tick, error: f32, replayed: usize },
}

impl ReconcileOutcome {
    /// `true` if the live state was rewritten.
    pub fn is_correction(&self) -> bool {
        matches!(self, Self::Corrected { .. })
    }
}

/// Running totals for a [`Reconciler`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReconcileStats {
    /// Authoritative states handed to [`Reconciler::receive`].
    pub received: u64,
    /// States compared and found within the threshold.
    pub accepted: u64,
    /// States that triggered a rewind and replay.
    pub corrected: u64,
    /// States ignored as duplicate, stale or unreconcilable.
    pub skipped: u64,
    /// Largest position error seen in a comparison.
    pub max_error: f32,
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Compares received authoritative states against the prediction history.
#[derive(Debug, Clone)]
pub struct Reconciler {
    threshold: f32,
    pending: Option<StatePayload>,
    last_reconciled: Option<StatePayload>,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Creates a reconciler that corrects errors strictly above `threshold`.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            pending: None,
            last_reconciled: None,
            stats: ReconcileStats::default(),
        }
    }

    /// Stores a newly received authoritative state.
    ///
    /// Only the newest one received since the last reconcile is kept; an
    /// older state arriving late is dropped here.
    pub fn receive(&mut self, state: StatePayload) {
        self.stats.received += 1;
        match self.pending {
            Some(pending) if pending.tick > state.tick => {
                tracing::trace!(tick = state.tick, pending = pending.tick, "dropping late state");
            }
            _ => self.pending = Some(state),
        }
    }

    /// `true` if a state is waiting to be reconciled.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Reconciles the pending state, if any, against `predictor`.
    ///
    /// `current_tick` is the tick about to be predicted: replay stops just
    /// before it. Every outcome other than [`ReconcileOutcome::Corrected`]
    /// leaves the predictor untouched.
    pub fn reconcile(
        &mut self,
        predictor: &mut ClientPredictor,
        simulator: &MovementSimulator,
        current_tick: Tick,
        source: RewindSource<'_>,
    ) -> ReconcileOutcome {
        let outcome = self.evaluate(predictor, simulator, current_tick, source);
        match outcome {
            ReconcileOutcome::NoUpdate => {}
            ReconcileOutcome::Accepted { .. } => self.stats.accepted += 1,
            ReconcileOutcome::Corrected { .. } => self.stats.corrected += 1,
            _ => self.stats.skipped += 1,
        }
        outcome
    }

    fn evaluate(
        &mut self,
        predictor: &mut ClientPredictor,
        simulator: &MovementSimulator,
        current_tick: Tick,
        source: RewindSource<'_>,
    ) -> ReconcileOutcome {
        let Some(server) = self.pending.take() else {
            return ReconcileOutcome::NoUpdate;
        };

        if let Some(last) = self.last_reconciled {
            if last == server {
                return ReconcileOutcome::Duplicate;
            }
            if server.tick < last.tick {
                return ReconcileOutcome::Stale;
            }
        }
        self.last_reconciled = Some(server);

        let tick = server.tick;
        let Some(predicted) = predictor.states().get_exact(tick) else {
            tracing::trace!(entity = %predictor.entity(), tick, "no prediction for tick");
            return ReconcileOutcome::MissingPrediction { tick };
        };

        let error = predicted.position_error(&server);
        self.stats.max_error = self.stats.max_error.max(error);
        if error <= self.threshold {
            return ReconcileOutcome::Accepted { tick, error };
        }

        let rewind = match source {
            RewindSource::Authoritative => server,
            RewindSource::HostHistory(history) => {
                match tick.checked_sub(1).and_then(|prev| history.get_exact(prev)) {
                    Some(state) => *state,
                    None => return ReconcileOutcome::NoPredecessor { tick },
                }
            }
        };

        // Replay reads inputs rewind.tick + 1 .. current_tick, which are all
        // still buffered while the window fits the ring.
        let window = current_tick.saturating_sub(rewind.tick);
        if window as usize > predictor.inputs().capacity() {
            tracing::warn!(
                entity = %predictor.entity(),
                tick,
                window,
                "replay window exceeds input history, skipping correction"
            );
            return ReconcileOutcome::WindowExceeded { tick, window };
        }

        let replayed = rewind_and_replay(predictor, simulator, rewind, current_tick);
        tracing::debug!(
            entity = %predictor.entity(),
            tick,
            error,
            replayed,
            "prediction corrected"
        );
        ReconcileOutcome::Corrected {
            tick,
            error,
            replayed,
        }
    }

    /// Position error above which a correction happens.
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// The last state that made it past the staleness checks.
    pub fn last_reconciled(&self) -> Option<&StatePayload> {
        self.last_reconciled.as_ref()
    }

    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }
}

/// Snaps `predictor` to `rewind` and re-simulates every tick after it up to,
/// but not including, `current_tick`.
///
/// Each replayed state overwrites the state ring. Inputs are read from the
/// input ring and are not sent again; a tick with no buffered input replays
/// as idle. Returns the number of ticks re-simulated.
pub fn rewind_and_replay(
    predictor: &mut ClientPredictor,
    simulator: &MovementSimulator,
    rewind: StatePayload,
    current_tick: Tick,
) -> usize {
    predictor.snap(rewind);

    let mut replayed = 0;
    for tick in rewind.tick.saturating_add(1)..current_tick {
        let input = match predictor.inputs().get_exact(tick) {
            Some(input) => *input,
            None => {
                tracing::trace!(entity = %predictor.entity(), tick, "replaying missing input as idle");
                InputPayload::idle(tick)
            }
        };
        let next = simulator.simulate(predictor.current(), &input);
        predictor.snap(next);
        replayed += 1;
    }
    replayed
}
