//! Shared test fixtures for rail_core and downstream crates.
//!
//! `base_content()` is the three-track dashboard scenario: trains A/B/C on
//! tracks A/B/C, two oncoming markers, every risk tier `safe` at t=0.

use crate::{
    initial_state, Aspect, Capabilities, Command, CommandEnvelope, Constants, Direction, MarkerId,
    OncomingMarker, OperatorId, RailContent, ScenarioDef, Side, SignalState, SimState, TrackId,
    Train, TrainId,
};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// An `up` train with a comfortable hazard distance (5 km).
pub fn train(id: &str, track: &str, position: f64, speed: f64) -> Train {
    Train {
        id: TrainId(id.to_string()),
        label: id.to_uppercase(),
        color: "#22c55e".to_string(),
        track: TrackId(track.to_string()),
        position,
        speed,
        direction: Direction::Up,
        distance_km: 5.0,
    }
}

pub fn marker(id: &str, track: &str, position: f64, direction: Direction) -> OncomingMarker {
    OncomingMarker {
        id: MarkerId(id.to_string()),
        label: id.to_string(),
        track: TrackId(track.to_string()),
        position,
        direction,
    }
}

fn signal(track: &str, side: Side, aspect: Aspect) -> SignalState {
    SignalState {
        track: TrackId(track.to_string()),
        side,
        aspect,
    }
}

/// Speeds 72/60/48, hazard distances 3.2/2.5/4.0 km, markers 3 km out.
pub fn base_content() -> RailContent {
    let mut a = train("train-a", "track-a", 40.0, 72.0);
    a.distance_km = 3.2;
    let mut b = train("train-b", "track-b", 55.0, 60.0);
    b.distance_km = 2.5;
    let mut c = train("train-c", "track-c", 70.0, 48.0);
    c.distance_km = 4.0;

    RailContent {
        content_version: "test".to_string(),
        scenario: ScenarioDef {
            trains: vec![a, b, c],
            signals: vec![
                signal("track-a", Side::Left, Aspect::Safe),
                signal("track-a", Side::Right, Aspect::Caution),
                signal("track-b", Side::Left, Aspect::Safe),
                signal("track-b", Side::Right, Aspect::Danger),
                signal("track-c", Side::Left, Aspect::Safe),
                signal("track-c", Side::Right, Aspect::Caution),
            ],
            oncoming: vec![
                marker("oncoming-72", "track-a", 80.0, Direction::Down),
                marker("oncoming-36", "track-c", 20.0, Direction::Down),
            ],
            animating: true,
        },
        constants: Constants::default(),
        capabilities: Capabilities::default(),
    }
}

pub fn base_state(content: &RailContent) -> SimState {
    initial_state(content)
}

pub fn operator() -> OperatorId {
    OperatorId("operator".to_string())
}

/// Wraps `command` with a fixed id, issued at `at_ms`.
pub fn command_at(at_ms: u64, command: Command) -> CommandEnvelope {
    CommandEnvelope {
        id: crate::CommandId("cmd_000001".to_string()),
        issued_by: operator(),
        issued_at_ms: at_ms,
        command,
    }
}

/// Deterministic RNG seeded with 42.
pub fn make_rng() -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(42)
}
