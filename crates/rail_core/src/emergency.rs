//! Emergency stop sequencing.
//!
//! Two independent paths:
//! - the all-trains stop, a fixed staged narration (activated, braking at
//!   +2 s, stopped at +4 s) whose stages the engine schedules as timers;
//! - the per-train stop, which puts a train in the stopping set and sheds
//!   speed on every stop-decay tick until it stands still.

use crate::{
    Capabilities, Capability, CommandOutcome, Constants, Event, EventEnvelope, GlobalStopPhase,
    RejectReason, SimState, Train, TrainId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GlobalStopStage {
    Braking,
    Completed,
}

/// Starts the all-trains stop. Returns the trains that should also be
/// decelerated through the per-train path.
pub(crate) fn begin_global_stop(
    state: &mut SimState,
    constants: &Constants,
    capabilities: Capabilities,
    events: &mut Vec<EventEnvelope>,
) -> Result<Vec<TrainId>, RejectReason> {
    if state.global_stop.in_progress() {
        return Err(RejectReason::GlobalStopInProgress);
    }
    let now = state.meta.now_ms;
    state.global_stop = GlobalStopPhase::Activated { started_ms: now };
    events.push(crate::emit(
        &mut state.counters,
        now,
        Event::EmergencyActivated { train_id: None },
    ));

    if !(constants.global_stop_brakes_all && capabilities.per_train_stop) {
        return Ok(Vec::new());
    }
    let braking: Vec<TrainId> = state
        .trains
        .iter()
        .filter(|train| train.speed > 0.0 && !state.stopping.contains(&train.id))
        .map(|train| train.id.clone())
        .collect();
    state.stopping.extend(braking.iter().cloned());
    Ok(braking)
}

pub(crate) fn advance_global_stop(
    state: &mut SimState,
    stage: GlobalStopStage,
    events: &mut Vec<EventEnvelope>,
) {
    let now = state.meta.now_ms;
    let (phase, event) = match (stage, state.global_stop) {
        (_, GlobalStopPhase::Idle)
        | (GlobalStopStage::Braking, GlobalStopPhase::Braking { .. }) => return,
        (GlobalStopStage::Braking, GlobalStopPhase::Activated { started_ms }) => (
            GlobalStopPhase::Braking { started_ms },
            Event::BrakingInProgress,
        ),
        (GlobalStopStage::Completed, _) => (GlobalStopPhase::Idle, Event::AllTrainsStopped),
    };
    state.global_stop = phase;
    events.push(crate::emit(&mut state.counters, now, event));
}

/// Guards and starts a per-train stop.
pub(crate) fn request_train_stop(
    state: &mut SimState,
    capabilities: Capabilities,
    train_id: &TrainId,
    events: &mut Vec<EventEnvelope>,
) -> CommandOutcome {
    if !capabilities.enabled(Capability::PerTrainStop) {
        return CommandOutcome::Rejected(RejectReason::CapabilityDisabled {
            capability: Capability::PerTrainStop,
        });
    }
    let Some(train) = state.trains.get(train_id) else {
        return CommandOutcome::Rejected(RejectReason::UnknownTrain {
            train_id: train_id.clone(),
        });
    };
    if state.stopping.contains(train_id) {
        return CommandOutcome::Rejected(RejectReason::AlreadyStopping {
            train_id: train_id.clone(),
        });
    }
    if train.speed <= 0.0 {
        return CommandOutcome::Rejected(RejectReason::AlreadyStopped {
            train_id: train_id.clone(),
        });
    }

    state.stopping.insert(train_id.clone());
    events.push(crate::emit(
        &mut state.counters,
        state.meta.now_ms,
        Event::EmergencyActivated {
            train_id: Some(train_id.clone()),
        },
    ));
    CommandOutcome::Applied
}

/// One stop-decay tick. Trains reaching standstill leave the stopping set
/// and announce it in the same step.
pub(crate) fn decay_tick(state: &mut SimState, constants: &Constants, events: &mut Vec<EventEnvelope>) {
    let stopping = &state.stopping;
    let mut halted: Vec<TrainId> = Vec::new();
    let next = state.trains.map(|train| {
        if !stopping.contains(&train.id) {
            return train.clone();
        }
        let speed = (train.speed - constants.stop_decay_step_kmh).max(0.0);
        if speed <= 0.0 {
            halted.push(train.id.clone());
        }
        Train {
            speed,
            ..train.clone()
        }
    });
    state.trains = next;

    // Ids with no train behind them can never halt.
    let trains = &state.trains;
    state.stopping.retain(|id| trains.contains(id));

    let now = state.meta.now_ms;
    for train_id in halted {
        state.stopping.remove(&train_id);
        events.push(crate::emit(
            &mut state.counters,
            now,
            Event::TrainStopped { train_id },
        ));
    }
}

/// Decay ticks needed to bring `speed` to a standstill.
pub fn ticks_to_halt(speed: f64, constants: &Constants) -> u64 {
    if speed <= 0.0 {
        return 0;
    }
    let ticks = (speed / constants.stop_decay_step_kmh).ceil();
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let ticks = ticks as u64;
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_fixtures::{base_content, base_state};

    fn id(s: &str) -> TrainId {
        TrainId(s.to_string())
    }

    #[test]
    fn ticks_to_halt_is_ceiling_of_speed_over_step() {
        let c = Constants::default();
        assert_eq!(ticks_to_halt(72.0, &c), 15);
        assert_eq!(ticks_to_halt(120.0, &c), 24);
        assert_eq!(ticks_to_halt(5.0, &c), 1);
        assert_eq!(ticks_to_halt(0.0, &c), 0);
    }

    #[test]
    fn request_rejects_unknown_and_duplicate() {
        let content = base_content();
        let mut state = base_state(&content);
        let mut events = Vec::new();
        let caps = content.capabilities;

        let outcome = request_train_stop(&mut state, caps, &id("ghost"), &mut events);
        assert!(matches!(
            outcome,
            CommandOutcome::Rejected(RejectReason::UnknownTrain { .. })
        ));

        assert!(request_train_stop(&mut state, caps, &id("train-a"), &mut events).is_applied());
        let again = request_train_stop(&mut state, caps, &id("train-a"), &mut events);
        assert!(matches!(
            again,
            CommandOutcome::Rejected(RejectReason::AlreadyStopping { .. })
        ));
        assert_eq!(state.stopping.len(), 1);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn decay_never_goes_negative_and_halts_once() {
        let content = base_content();
        let mut state = base_state(&content);
        let mut events = Vec::new();
        state.trains = state.trains.update(&id("train-a"), |t| t.speed = 3.0).unwrap();
        request_train_stop(&mut state, content.capabilities, &id("train-a"), &mut events);
        events.clear();

        decay_tick(&mut state, &content.constants, &mut events);
        decay_tick(&mut state, &content.constants, &mut events);

        let train = state.trains.get(&id("train-a")).unwrap();
        assert!(train.speed.abs() < 1e-12);
        assert!(state.stopping.is_empty());
        let stopped = events
            .iter()
            .filter(|e| matches!(e.event, Event::TrainStopped { .. }))
            .count();
        assert_eq!(stopped, 1);
    }

    #[test]
    fn decay_leaves_other_trains_alone() {
        let content = base_content();
        let mut state = base_state(&content);
        let mut events = Vec::new();
        let before = state.trains.get(&id("train-b")).unwrap().speed;
        request_train_stop(&mut state, content.capabilities, &id("train-a"), &mut events);
        decay_tick(&mut state, &content.constants, &mut events);
        let after = state.trains.get(&id("train-b")).unwrap().speed;
        assert!((before - after).abs() < 1e-12);
    }

    #[test]
    fn braking_stage_after_completion_is_ignored() {
        let content = base_content();
        let mut state = base_state(&content);
        let mut events = Vec::new();
        advance_global_stop(&mut state, GlobalStopStage::Braking, &mut events);
        assert!(events.is_empty());
        assert_eq!(state.global_stop, GlobalStopPhase::Idle);
    }
}
