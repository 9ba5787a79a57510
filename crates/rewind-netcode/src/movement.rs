//! Shared movement simulation.
//!
//! [`MovementSimulator::simulate`] is the single function both the client
//! (prediction and replay) and the server (authority) run. It only reads the
//! previous state, the input and fixed configuration, and it steps by the
//! fixed tick duration, so the same state and input always give a
//! bit-identical result.

use glam::{EulerRot, Quat, Vec2, Vec3};
use rewind_config::{Config, MovementConfig};
use rewind_net::{InputPayload, StatePayload};

/// Height above the ground plane that still counts as standing on it.
pub const GROUND_TOLERANCE: f32 = 1e-3;

/// Deterministic character movement: look, planar walk, jump, gravity.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementSimulator {
    move_speed: f32,
    jump_speed: f32,
    gravity: f32,
    look_sensitivity_rad: f32,
    pitch_min_rad: f32,
    pitch_max_rad: f32,
    ground_height: f32,
    tick_duration: f32,
}

impl MovementSimulator {
    /// Creates a simulator stepping at `tick_rate` Hz.
    pub fn new(config: &MovementConfig, tick_rate: u32) -> Self {
        Self {
            move_speed: config.move_speed,
            jump_speed: config.jump_speed,
            gravity: config.gravity,
            look_sensitivity_rad: config.look_sensitivity_deg.to_radians(),
            pitch_min_rad: config.pitch_min_deg.to_radians(),
            pitch_max_rad: config.pitch_max_deg.to_radians(),
            ground_height: config.ground_height,
            tick_duration: 1.0 / tick_rate.max(1) as f32,
        }
    }

    /// Creates a simulator from the full configuration.
    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.movement, config.simulation.tick_rate)
    }

    /// Fixed step in seconds.
    pub fn tick_duration(&self) -> f32 {
        self.tick_duration
    }

    /// Standing on the ground and not moving upward.
    pub fn is_grounded(&self, state: &StatePayload) -> bool {
        state.position.y <= self.ground_height + GROUND_TOLERANCE && state.linear_velocity.y <= 0.0
    }

    /// Advances `state` by one tick under `input`.
    ///
    /// The result is stamped with the input's tick.
    pub fn simulate(&self, state: &StatePayload, input: &InputPayload) -> StatePayload {
        let dt = self.tick_duration;
        let look = finite_or_zero2(input.look_vector);
        let movement = finite_or_zero3(input.move_vector);

        let (yaw, pitch) = yaw_pitch(state.orientation);

        // Planar walk relative to the heading held at the start of the tick;
        // pitch never tilts movement.
        let heading = Quat::from_rotation_y(yaw);
        let right = heading * Vec3::X;
        let forward = heading * Vec3::NEG_Z;
        let direction = (right * movement.x + forward * movement.z).clamp_length_max(1.0);

        // Look: yaw is free, pitch is clamped on its own.
        let yaw_delta = look.x * self.look_sensitivity_rad;
        let new_yaw = yaw + yaw_delta;
        let new_pitch = (pitch + look.y * self.look_sensitivity_rad)
            .clamp(self.pitch_min_rad, self.pitch_max_rad);
        let orientation = orientation_from(new_yaw, new_pitch);

        let mut velocity = Vec3::new(
            direction.x * self.move_speed,
            state.linear_velocity.y,
            direction.z * self.move_speed,
        );

        let grounded = self.is_grounded(state);
        if grounded && input.jump_requested {
            velocity.y = self.jump_speed;
        } else if grounded {
            velocity.y = 0.0;
        } else {
            velocity.y -= self.gravity * dt;
        }

        let mut position = state.position + velocity * dt;
        if position.y < self.ground_height {
            position.y = self.ground_height;
            velocity.y = velocity.y.max(0.0);
        }

        StatePayload {
            tick: input.tick,
            position,
            orientation,
            linear_velocity: velocity,
            angular_velocity: Vec3::new((new_pitch - pitch) / dt, yaw_delta / dt, 0.0),
        }
    }
}

/// Splits an orientation into (yaw, pitch) in radians.
pub fn yaw_pitch(orientation: Quat) -> (f32, f32) {
    let (yaw, pitch, _roll) = orientation.to_euler(EulerRot::YXZ);
    (yaw, pitch)
}

/// Builds an orientation from yaw about +Y followed by pitch about local +X.
pub fn orientation_from(yaw: f32, pitch: f32) -> Quat {
    Quat::from_euler(EulerRot::YXZ, yaw, pitch, 0.0)
}

fn finite_or_zero2(v: Vec2) -> Vec2 {
    if v.is_finite() { v } else { Vec2::ZERO }
}

fn finite_or_zero3(v: Vec3) -> Vec3 {
    if v.is_finite() { v } else { Vec3::ZERO }
}
