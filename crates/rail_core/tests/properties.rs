//! Invariants under seeded random command streams.

use rail_core::test_fixtures::{base_content, make_rng, operator};
use rail_core::*;
use rand::Rng;
use std::collections::BTreeSet;

const TRAINS: [&str; 4] = ["train-a", "train-b", "train-c", "ghost"];
const TRACKS: [&str; 3] = ["track-a", "track-b", "track-c"];

fn random_command(rng: &mut impl Rng) -> Command {
    let train_id = TrainId(TRAINS[rng.gen_range(0..TRAINS.len())].to_string());
    match rng.gen_range(0..10) {
        0..=3 => Command::SetSpeed {
            train_id,
            speed: rng.gen_range(-20.0..140.0),
        },
        4 | 5 => Command::StopTrain { train_id },
        6 | 7 => Command::CycleSignal {
            track_id: TrackId(TRACKS[rng.gen_range(0..TRACKS.len())].to_string()),
            side: if rng.gen_bool(0.5) { Side::Left } else { Side::Right },
        },
        8 => Command::ToggleAnimation,
        _ => Command::EmergencyStopAll,
    }
}

/// Runs 60 s of virtual time with a command every 250 ms. Returns every event.
fn soak(check: impl Fn(&Simulation)) -> Vec<EventEnvelope> {
    let mut rng = make_rng();
    let mut sim = Simulation::new(base_content());
    let mut next_id = 0;
    let mut all = Vec::new();
    for step in 1..=240_u64 {
        let cmd = make_command(&operator(), sim.now_ms(), &mut next_id, random_command(&mut rng));
        let (_, events) = sim.apply(&cmd);
        all.extend(events);
        all.extend(sim.advance_to(step * 250));
        check(&sim);
    }
    all
}

#[test]
fn positions_and_speeds_stay_in_range() {
    soak(|sim| {
        for train in sim.state().trains.iter() {
            assert!((0.0..100.0).contains(&train.position), "{train:?}");
            assert!((0.0..=120.0).contains(&train.speed), "{train:?}");
        }
    });
}

#[test]
fn stopping_set_only_names_known_trains() {
    soak(|sim| {
        for id in &sim.state().stopping {
            assert!(sim.state().trains.contains(id), "stray stopping id {id}");
        }
    });
}

#[test]
fn every_stopped_train_was_activated_first() {
    let events = soak(|_| {});
    let mut active: BTreeSet<TrainId> = BTreeSet::new();
    let mut global = false;
    for envelope in &events {
        match &envelope.event {
            Event::EmergencyActivated { train_id: Some(id) } => {
                active.insert(id.clone());
            }
            Event::EmergencyActivated { train_id: None } => global = true,
            Event::TrainStopped { train_id } => {
                assert!(
                    active.remove(train_id) || global,
                    "{train_id} stopped without an activation"
                );
            }
            _ => {}
        }
    }
}

#[test]
fn same_seed_same_history() {
    let a = soak(|_| {});
    let b = soak(|_| {});
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.id, y.id);
        assert_eq!(x.at_ms, y.at_ms);
        assert_eq!(x.event, y.event);
    }
}

#[test]
fn braking_always_precedes_completion() {
    let events = soak(|_| {});
    let mut phase = 0;
    for envelope in &events {
        match envelope.event {
            Event::EmergencyActivated { train_id: None } => {
                assert_eq!(phase, 0);
                phase = 1;
            }
            Event::BrakingInProgress => {
                assert_eq!(phase, 1);
                phase = 2;
            }
            Event::AllTrainsStopped => {
                assert_eq!(phase, 2);
                phase = 0;
            }
            _ => {}
        }
    }
}
