use super::*;
use crate::test_fixtures::{base_content, command_at, marker, train};

mod emergency;
mod risk;

// --- Shared test helpers ------------------------------------------------

fn test_sim() -> Simulation {
    Simulation::new(base_content())
}

fn train_id(id: &str) -> TrainId {
    TrainId(id.to_string())
}

fn track_id(id: &str) -> TrackId {
    TrackId(id.to_string())
}

fn apply(sim: &mut Simulation, command: Command) -> (CommandOutcome, Vec<EventEnvelope>) {
    let envelope = command_at(sim.now_ms(), command);
    sim.apply(&envelope)
}

fn speed_of(sim: &Simulation, id: &str) -> f64 {
    sim.state().trains.get(&train_id(id)).unwrap().speed
}

fn position_of(sim: &Simulation, id: &str) -> f64 {
    sim.state().trains.get(&train_id(id)).unwrap().position
}

fn count_events(events: &[EventEnvelope], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(&e.event)).count()
}
