//! Per-tick input sampling.
//!
//! Device polling lives outside the netcode. Whatever produces input
//! implements [`InputSource`]; the predictor asks it for one
//! [`InputSample`] per tick and stamps it into an [`InputPayload`].

use glam::{Vec2, Vec3};
use rewind_net::{InputPayload, Tick};

/// Unstamped input for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSample {
    /// `x` strafes right, `z` moves forward. Longer than one is clamped by
    /// the simulator.
    pub move_vector: Vec3,
    /// `x` is yaw, `y` is pitch.
    pub look_vector: Vec2,
    pub jump: bool,
    pub fire: bool,
}

impl InputSample {
    /// No movement, look or buttons.
    pub const IDLE: Self = Self {
        move_vector: Vec3::ZERO,
        look_vector: Vec2::ZERO,
        jump: false,
        fire: false,
    };

    /// Sample that only moves.
    pub fn moving(move_vector: Vec3) -> Self {
        Self {
            move_vector,
            ..Self::IDLE
        }
    }

    /// Binds the sample to `tick`.
    pub fn stamp(&self, tick: Tick) -> InputPayload {
        InputPayload {
            tick,
            move_vector: self.move_vector,
            look_vector: self.look_vector,
            jump_requested: self.jump,
            fire_requested: self.fire,
        }
    }
}

/// Produces the local player's input, once per tick.
pub trait InputSource {
    /// Input for the tick about to be predicted.
    fn sample(&mut self) -> InputSample;
}

impl<F> InputSource for F
where
    F: FnMut() -> InputSample,
{
    fn sample(&mut self) -> InputSample {
        self()
    }
}

/// Replays a fixed list of samples, looping at the end.
#[derive(Debug, Clone)]
pub struct ScriptedInput {
    samples: Vec<InputSample>,
    cursor: usize,
}

impl ScriptedInput {
    /// Cycles through `samples`. An empty list behaves like [`idle`](Self::idle).
    pub fn new(samples: Vec<InputSample>) -> Self {
        Self { samples, cursor: 0 }
    }

    /// Always returns `sample`.
    pub fn constant(sample: InputSample) -> Self {
        Self::new(vec![sample])
    }

    /// Always idle.
    pub fn idle() -> Self {
        Self::constant(InputSample::IDLE)
    }

    /// Appends `sample` repeated `ticks` times.
    pub fn then(mut self, sample: InputSample, ticks: usize) -> Self {
        self.samples.extend(std::iter::repeat_n(sample, ticks));
        self
    }

    /// Number of samples before the script loops.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl InputSource for ScriptedInput {
    fn sample(&mut self) -> InputSample {
        if self.samples.is_empty() {
            return InputSample::IDLE;
        }
        let sample = self.samples[self.cursor];
        self.cursor = (self.cursor + 1) % self.samples.len();
        sample
    }
}
