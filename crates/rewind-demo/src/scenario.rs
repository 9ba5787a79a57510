//! Simulated play sessions.
//!
//! Runs either a dedicated server and one remote client over a conditioned
//! link, or a single host, with jittered frame times, scripted input and
//! periodic server-side knockback.

use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use rewind_config::{Config, ConfigError};
use rewind_net::{Endpoint, EntityId, LinkConditioner, LinkStats, StatePayload};
use rewind_netcode::{
    ClientId, EntitySet, InputSample, NetworkedEntity, ReconcileStats, ScriptedInput, Session,
};
use tracing::{debug, info};

const PLAYER: ClientId = ClientId(1);
const ENTITY: EntityId = EntityId(1);

/// Chance per frame of a long hitch that exercises the catch-up cap.
const HITCH_CHANCE: f64 = 0.005;
const HITCH_SECS: f64 = 0.25;

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct ScenarioOptions {
    pub seconds: f64,
    pub knockback_every_secs: f64,
    pub knockback_strength: f32,
    pub frame_seed: u64,
}

/// What happened during a run.
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub frames: u64,
    pub ticks: u64,
    pub knockbacks: u32,
    pub reconcile: ReconcileStats,
    pub server_link: LinkStats,
    pub client_link: LinkStats,
    pub dropped_ticks: u64,
    pub final_error: f32,
}

impl Report {
    pub fn log(&self) {
        info!(
            frames = self.frames,
            ticks = self.ticks,
            knockbacks = self.knockbacks,
            dropped_ticks = self.dropped_ticks,
            "run finished"
        );
        info!(
            received = self.reconcile.received,
            accepted = self.reconcile.accepted,
            corrected = self.reconcile.corrected,
            skipped = self.reconcile.skipped,
            max_error = self.reconcile.max_error,
            final_error = self.final_error,
            "reconciliation"
        );
        info!(
            inputs_dropped = self.server_link.dropped,
            inputs_duplicated = self.server_link.duplicated,
            states_dropped = self.client_link.dropped,
            states_duplicated = self.client_link.duplicated,
            "link"
        );
    }
}

/// Walks a loop: forward, strafe, turn, hop.
fn player_script() -> ScriptedInput {
    let forward = InputSample::moving(Vec3::Z);
    ScriptedInput::new(Vec::new())
        .then(forward, 96)
        .then(InputSample::moving(Vec3::new(1.0, 0.0, 0.0)), 48)
        .then(
            InputSample {
                look_vector: Vec2::new(3.0, 0.0),
                ..forward
            },
            30,
        )
        .then(InputSample { jump: true, ..forward }, 1)
        .then(forward, 40)
        .then(InputSample::IDLE, 32)
}

struct Frames {
    rng: Xoshiro256StarStar,
    base: f64,
}

impl Frames {
    fn new(seed: u64, tick_rate: u32) -> Self {
        Self {
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            base: 1.0 / f64::from(tick_rate),
        }
    }

    /// Elapsed time for the next frame.
    fn next_elapsed(&mut self) -> f64 {
        if self.rng.gen_bool(HITCH_CHANCE) {
            return HITCH_SECS;
        }
        self.base * self.rng.gen_range(0.5..1.5)
    }

    fn knockback(&mut self, strength: f32) -> Vec3 {
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        Vec3::new(angle.cos(), 0.0, angle.sin()) * strength
    }
}

fn knock(set: &mut EntitySet, offset: Vec3) -> bool {
    let Some(authority) = set.get_mut(ENTITY).and_then(NetworkedEntity::authority_mut) else {
        return false;
    };
    let mut state = *authority.current();
    state.position += offset;
    authority.override_state(state);
    debug!(?offset, tick = state.tick, "knockback");
    true
}

fn spawn_state() -> StatePayload {
    StatePayload::at_rest(0, Vec3::ZERO)
}

/// Dedicated server plus one remote client.
pub fn run_dedicated(config: &Config, options: &ScenarioOptions) -> Result<Report, ConfigError> {
    let server_session = Session::server(config.clone())?;
    let client_session = Session::client(PLAYER, config.clone())?;

    let mut server = EntitySet::new();
    let mut client = EntitySet::new();
    let spawned = server
        .insert(NetworkedEntity::spawn(
            &server_session,
            ENTITY,
            PLAYER,
            spawn_state(),
            None,
        ))
        .and_then(|()| {
            client.insert(NetworkedEntity::spawn(
                &client_session,
                ENTITY,
                PLAYER,
                spawn_state(),
                Some(Box::new(player_script())),
            ))
        });
    if let Err(e) = spawned {
        tracing::error!("{e}");
    }

    let (mut client_end, mut server_end) = Endpoint::pair(&config.link);
    let mut frames = Frames::new(options.frame_seed, config.simulation.tick_rate);

    let mut report = Report::default();
    let mut elapsed_total = 0.0;
    let mut since_knock = 0.0;
    while elapsed_total < options.seconds {
        let elapsed = frames.next_elapsed();
        elapsed_total += elapsed;
        since_knock += elapsed;

        if options.knockback_every_secs > 0.0 && since_knock >= options.knockback_every_secs {
            since_knock = 0.0;
            let offset = frames.knockback(options.knockback_strength);
            if knock(&mut server, offset) {
                report.knockbacks += 1;
            }
        }

        server.pump(&mut server_end);
        server.tick(elapsed, &server_end);
        client.pump(&mut client_end);
        report.ticks += client.tick(elapsed, &client_end) as u64;
        report.frames += 1;
    }

    if let (Some(server_entity), Some(client_entity)) = (server.get(ENTITY), client.get(ENTITY)) {
        report.reconcile = client_entity.reconciler().stats();
        report.dropped_ticks = client_entity.clock().dropped_ticks();
        report.final_error = server_entity
            .transform()
            .position_error(client_entity.transform());
    }
    report.server_link = server_end.link_stats();
    report.client_link = client_end.link_stats();
    Ok(report)
}

/// A host whose own player never touches the network.
pub fn run_host(config: &Config, options: &ScenarioOptions) -> Result<Report, ConfigError> {
    let session = Session::host(PLAYER, config.clone())?;
    let mut set = EntitySet::new();
    if let Err(e) = set.insert(NetworkedEntity::spawn(
        &session,
        ENTITY,
        PLAYER,
        spawn_state(),
        Some(Box::new(player_script())),
    )) {
        tracing::error!("{e}");
    }

    let mut transport = Endpoint::loopback(LinkConditioner::new(&config.link));
    let mut frames = Frames::new(options.frame_seed, config.simulation.tick_rate);

    let mut report = Report::default();
    let mut elapsed_total = 0.0;
    let mut since_knock = 0.0;
    while elapsed_total < options.seconds {
        let elapsed = frames.next_elapsed();
        elapsed_total += elapsed;
        since_knock += elapsed;

        if options.knockback_every_secs > 0.0 && since_knock >= options.knockback_every_secs {
            since_knock = 0.0;
            let offset = frames.knockback(options.knockback_strength);
            if knock(&mut set, offset) {
                report.knockbacks += 1;
            }
        }

        set.pump(&mut transport);
        report.ticks += set.tick(elapsed, &transport) as u64;
        report.frames += 1;
    }

    if let Some(entity) = set.get(ENTITY) {
        report.reconcile = entity.reconciler().stats();
        report.dropped_ticks = entity.clock().dropped_ticks();
        if let (Some(authority), Some(predictor)) = (entity.authority(), entity.predictor()) {
            report.final_error = authority.current().position_error(predictor.current());
        }
    }
    report.server_link = transport.link_stats();
    Ok(report)
}
