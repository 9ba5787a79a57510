use glam::{Vec2, Vec3};
use rewind_config::{Config, LinkConfig};
use rewind_net::LinkConditioner;

use super::*;
use crate::input::InputSample;

const DT: f64 = 1.0 / 64.0;
const PLAYER: ClientId = ClientId(1);
const ID: EntityId = EntityId(1);

fn config(threshold: f32) -> Config {
    let mut config = Config::default();
    config.reconciliation.threshold = threshold;
    config
}

fn spawn_state() -> StatePayload {
    StatePayload::at_rest(0, Vec3::ZERO)
}

/// Forward, then a forward-right diagonal, then forward while turning.
fn walk_script() -> ScriptedInput {
    ScriptedInput::new(Vec::new())
        .then(InputSample::moving(Vec3::Z), 40)
        .then(InputSample::moving(Vec3::new(1.0, 0.0, 0.5)), 30)
        .then(
            InputSample {
                look_vector: Vec2::new(2.0, 0.0),
                ..InputSample::moving(Vec3::Z)
            },
            20,
        )
}

/// A dedicated server and one remote client joined by a pair of endpoints.
struct Match {
    server: EntitySet,
    client: EntitySet,
    server_end: Endpoint,
    client_end: Endpoint,
}

impl Match {
    fn new(config: Config, link: Option<LinkConfig>, input: Box<dyn InputSource>) -> Self {
        let server_session = Session::server(config.clone()).expect("valid config");
        let client_session = Session::client(PLAYER, config).expect("valid config");

        let mut server = EntitySet::new();
        server
            .insert(NetworkedEntity::spawn(
                &server_session,
                ID,
                PLAYER,
                spawn_state(),
                None,
            ))
            .expect("fresh set");
        let mut client = EntitySet::new();
        client
            .insert(NetworkedEntity::spawn(
                &client_session,
                ID,
                PLAYER,
                spawn_state(),
                Some(input),
            ))
            .expect("fresh set");

        let (client_end, server_end) = match link {
            Some(link) => Endpoint::pair(&link),
            None => Endpoint::pair_ideal(),
        };
        Self {
            server,
            client,
            server_end,
            client_end,
        }
    }

    fn frame(&mut self) {
        self.server.pump(&mut self.server_end);
        self.server.tick(DT, &self.server_end);
        self.client.pump(&mut self.client_end);
        self.client.tick(DT, &self.client_end);
    }

    fn run(&mut self, frames: usize) {
        for _ in 0..frames {
            self.frame();
        }
    }

    fn server_entity(&self) -> &NetworkedEntity {
        self.server.get(ID).expect("server entity")
    }

    fn client_entity(&self) -> &NetworkedEntity {
        self.client.get(ID).expect("client entity")
    }

    fn knock(&mut self, offset: Vec3) {
        let authority = self
            .server
            .get_mut(ID)
            .and_then(NetworkedEntity::authority_mut)
            .expect("server authority");
        let mut knocked = *authority.current();
        knocked.position += offset;
        authority.override_state(knocked);
    }

    /// The server's latest state matches what the client recorded for the
    /// same tick.
    fn assert_in_agreement(&self) {
        let server = *self.server_entity().authority().expect("authority").current();
        let predictor = self.client_entity().predictor().expect("predictor");
        assert_eq!(predictor.states().get_exact(server.tick), Some(&server));
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

#[test]
fn test_roles_decide_components() {
    let server = Session::server(Config::default()).expect("valid config");
    let client = Session::client(PLAYER, Config::default()).expect("valid config");
    let host = Session::host(PLAYER, Config::default()).expect("valid config");

    let on_server = NetworkedEntity::spawn(&server, ID, PLAYER, spawn_state(), None);
    assert!(on_server.authority().is_some());
    assert!(on_server.predictor().is_none());

    let owned = NetworkedEntity::spawn(&client, ID, PLAYER, spawn_state(), None);
    assert!(owned.authority().is_none());
    assert!(owned.predictor().is_some());

    let remote = NetworkedEntity::spawn(&client, EntityId(2), ClientId(2), spawn_state(), None);
    assert!(remote.authority().is_none());
    assert!(remote.predictor().is_none());

    let hosted = NetworkedEntity::spawn(&host, ID, PLAYER, spawn_state(), None);
    assert!(hosted.authority().is_some());
    assert!(hosted.predictor().is_some());
    assert_eq!(hosted.role(), Role::Host);
}

#[test]
fn test_tick_respects_catch_up_cap() {
    let session = Session::client(PLAYER, Config::default()).expect("valid config");
    let mut entity = NetworkedEntity::spawn(&session, ID, PLAYER, spawn_state(), None);
    let transport = Endpoint::loopback(LinkConditioner::ideal());

    assert_eq!(entity.tick(DT, &transport), 1);
    assert_eq!(entity.tick(1.0, &transport), 8);
    assert_eq!(entity.clock().tick(), 9);
    assert_eq!(entity.predictor().and_then(ClientPredictor::last_predicted), Some(9));
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[test]
fn test_insert_rejects_duplicate_id() {
    let session = Session::server(Config::default()).expect("valid config");
    let mut set = EntitySet::new();
    set.insert(NetworkedEntity::spawn(&session, ID, PLAYER, spawn_state(), None))
        .expect("first insert");
    let again = set.insert(NetworkedEntity::spawn(&session, ID, PLAYER, spawn_state(), None));
    assert_eq!(again, Err(EntityError::AlreadySpawned(ID)));
    assert_eq!(set.len(), 1);
}

#[test]
fn test_deliver_routes_by_entity_and_message() {
    let session = Session::client(PLAYER, Config::default()).expect("valid config");
    let mut set = EntitySet::new();
    set.insert(NetworkedEntity::spawn(&session, ID, PLAYER, spawn_state(), None))
        .expect("insert");
    set.insert(NetworkedEntity::spawn(
        &session,
        EntityId(2),
        ClientId(2),
        spawn_state(),
        None,
    ))
    .expect("insert");

    // Unknown entity.
    assert!(!set.deliver(Envelope {
        entity: EntityId(99),
        message: Message::StateBroadcast(spawn_state()),
    }));
    // A client is never authoritative.
    assert!(!set.deliver(Envelope {
        entity: ID,
        message: Message::InputSubmit(InputPayload::idle(1)),
    }));

    assert!(set.deliver(Envelope {
        entity: ID,
        message: Message::StateBroadcast(spawn_state()),
    }));
    assert!(set.get(ID).expect("owned").reconciler().has_pending());

    let elsewhere = StatePayload::at_rest(4, Vec3::new(7.0, 0.0, 1.0));
    assert!(set.deliver(Envelope {
        entity: EntityId(2),
        message: Message::StateBroadcast(elsewhere),
    }));
    assert_eq!(set.get(EntityId(2)).expect("remote").transform(), &elsewhere);
}

#[test]
fn test_remote_entity_ignores_older_states() {
    let session = Session::client(PLAYER, Config::default()).expect("valid config");
    let mut remote = NetworkedEntity::spawn(&session, ID, ClientId(2), spawn_state(), None);
    let newer = StatePayload::at_rest(10, Vec3::X);
    remote.receive_state(newer);
    remote.receive_state(StatePayload::at_rest(8, Vec3::Y));
    assert_eq!(remote.transform(), &newer);
}

#[test]
fn test_input_sender_feeds_server_entity() {
    let session = Session::server(Config::default()).expect("valid config");
    let mut entity = NetworkedEntity::spawn(&session, ID, PLAYER, spawn_state(), None);
    let sender = entity.input_sender().expect("server entity has a queue");
    let forward = InputSample::moving(Vec3::Z);

    std::thread::spawn(move || {
        for tick in 1..=4 {
            sender.enqueue(forward.stamp(tick));
        }
    })
    .join()
    .expect("sender thread panicked");

    let (_client_end, server_end) = Endpoint::pair_ideal();
    entity.tick(DT, &server_end);
    assert_eq!(entity.transform().tick, 4);
    assert_eq!(server_end.stats().sent, 1);
}

// ---------------------------------------------------------------------------
// Client and server
// ---------------------------------------------------------------------------

#[test]
fn test_ideal_link_never_corrects() {
    let mut game = Match::new(config(0.01), None, Box::new(walk_script()));
    game.run(200);

    let stats = game.client_entity().reconciler().stats();
    assert_eq!(stats.corrected, 0);
    assert!(stats.accepted > 150, "accepted {}", stats.accepted);
    assert_eq!(stats.max_error, 0.0);
    assert!(game.server_entity().authority().expect("authority").stats().applied > 150);
    game.assert_in_agreement();
}

#[test]
fn test_knockback_is_corrected_once() {
    let mut control = Match::new(config(0.01), None, Box::new(walk_script()));
    let mut game = Match::new(config(0.01), None, Box::new(walk_script()));
    control.run(100);
    game.run(100);

    game.knock(Vec3::new(3.0, 0.0, 0.0));
    control.run(60);
    game.run(60);

    let client = game.client_entity();
    assert_eq!(client.reconciler().stats().corrected, 1);
    game.assert_in_agreement();

    let shift = client.transform().position - control.client_entity().transform().position;
    assert!((shift - Vec3::new(3.0, 0.0, 0.0)).length() < 1e-3, "shift {shift}");
}

#[test]
fn test_lossy_link_converges_when_idle() {
    let link = LinkConfig {
        drop_rate: 0.15,
        duplicate_rate: 0.1,
        min_latency_steps: 0,
        max_latency_steps: 3,
        seed: 11,
    };
    let mut ticks = 0;
    let input = move || {
        ticks += 1;
        if ticks <= 300 {
            InputSample::moving(Vec3::new(0.4, 0.0, 1.0))
        } else {
            InputSample::IDLE
        }
    };
    let threshold = 0.05;
    let mut game = Match::new(config(threshold), Some(link), Box::new(input));
    game.run(700);

    assert!(game.server_end.link_stats().dropped > 0);
    let stats = game.client_entity().reconciler().stats();
    assert!(stats.corrected > 0, "lost inputs should force corrections");

    let server = game.server_entity().transform().position;
    let client = game.client_entity().transform().position;
    assert!(
        server.distance(client) <= threshold,
        "server {server} client {client}"
    );
}

// ---------------------------------------------------------------------------
// Host
// ---------------------------------------------------------------------------

#[test]
fn test_host_predicts_and_corrects_locally() {
    let session = Session::host(PLAYER, config(0.01)).expect("valid config");
    let mut set = EntitySet::new();
    set.insert(NetworkedEntity::spawn(
        &session,
        ID,
        PLAYER,
        spawn_state(),
        Some(Box::new(walk_script())),
    ))
    .expect("insert");
    let mut transport = Endpoint::loopback(LinkConditioner::ideal());

    for _ in 0..100 {
        set.pump(&mut transport);
        set.tick(DT, &transport);
    }
    let host = set.get(ID).expect("host entity");
    assert_eq!(host.reconciler().stats().corrected, 0);
    assert!(host.reconciler().stats().accepted > 90);
    assert_eq!(transport.stats().sent, 0, "a host's own entity stays off the wire");

    let authority = set
        .get_mut(ID)
        .and_then(NetworkedEntity::authority_mut)
        .expect("authority");
    let mut knocked = *authority.current();
    knocked.position += Vec3::new(0.0, 0.0, 4.0);
    authority.override_state(knocked);

    for _ in 0..20 {
        set.pump(&mut transport);
        set.tick(DT, &transport);
    }
    let host = set.get(ID).expect("host entity");
    assert_eq!(host.reconciler().stats().corrected, 1);
    let server = *host.authority().expect("authority").current();
    let predictor = host.predictor().expect("predictor");
    assert_eq!(predictor.states().get_exact(server.tick), Some(&server));
    assert_eq!(predictor.current().tick, host.clock().tick());
}
