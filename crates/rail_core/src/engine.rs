use std::collections::BTreeSet;

use crate::collision::evaluate;
use crate::emergency::{self, advance_global_stop, begin_global_stop, request_train_stop, GlobalStopStage};
use crate::motion::{advance_positions, advance_track_offset};
use crate::registry::{clamp_speed, TrainRegistry};
use crate::scheduler::{Scheduler, TimerHandle};
use crate::signals::SignalController;
use crate::{
    Command, CommandEnvelope, CommandOutcome, Constants, Counters, Event, EventEnvelope,
    GlobalStopPhase, MetaState, RailContent, RejectReason, RiskAssessment, Side, SimState,
    Snapshot, TrackId, TrainId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Motion,
    StopDecay,
    GlobalStop(GlobalStopStage),
}

/// Fresh state from scenario seed data, clock at zero.
pub fn initial_state(content: &RailContent) -> SimState {
    let scenario = &content.scenario;
    SimState {
        meta: MetaState {
            now_ms: 0,
            content_version: content.content_version.clone(),
            motion_ticks: 0,
            decay_ticks: 0,
        },
        trains: TrainRegistry::new(scenario.trains.clone(), content.constants.max_speed_kmh),
        signals: SignalController::new(scenario.signals.clone()),
        oncoming: scenario.oncoming.clone(),
        stopping: BTreeSet::new(),
        animating: scenario.animating,
        global_stop: GlobalStopPhase::Idle,
        track_offset: 0.0,
        counters: Counters::default(),
    }
}

/// Rounds an operator set-point to the nearest speed step, then clamps.
pub fn snap_speed(value: f64, constants: &Constants) -> f64 {
    let step = constants.speed_step_kmh;
    let snapped = if step > 0.0 {
        (value / step).round() * step
    } else {
        value
    };
    clamp_speed(snapped, constants.max_speed_kmh)
}

fn assess(state: &SimState, content: &RailContent) -> RiskAssessment {
    evaluate(
        state.trains.as_slice(),
        &state.oncoming,
        &content.constants,
        content.capabilities,
    )
}

/// Owns the train registry, signals, stopping set and every timer.
///
/// Commands enter through [`Simulation::apply`]; time moves only through
/// [`Simulation::advance_to`]. Each timer firing replaces the train
/// collection whole and re-evaluates collision risk.
#[derive(Debug)]
pub struct Simulation {
    state: SimState,
    content: RailContent,
    timers: Scheduler<Timer>,
    motion_timer: Option<TimerHandle>,
    decay_timer: Option<TimerHandle>,
    staged_timers: Vec<TimerHandle>,
    assessment: RiskAssessment,
}

impl Simulation {
    pub fn new(content: RailContent) -> Self {
        Self::from_state(initial_state(&content), content)
    }

    /// Resumes from an existing state, re-arming whatever timers it implies.
    pub fn from_state(mut state: SimState, content: RailContent) -> Self {
        // Saved positions and speeds may be out of range.
        state.trains = TrainRegistry::new(
            state.trains.as_slice().to_vec(),
            content.constants.max_speed_kmh,
        );
        let assessment = assess(&state, &content);
        let mut sim = Self {
            state,
            content,
            timers: Scheduler::new(),
            motion_timer: None,
            decay_timer: None,
            staged_timers: Vec::new(),
            assessment,
        };
        if sim.state.animating {
            sim.arm_motion();
        }
        if !sim.state.stopping.is_empty() {
            sim.arm_decay();
        }
        let c = &sim.content.constants;
        let (braking_at, stopped_at) = (c.braking_notice_delay_ms, c.stopped_notice_delay_ms);
        match sim.state.global_stop {
            GlobalStopPhase::Idle => {}
            GlobalStopPhase::Activated { started_ms } => {
                sim.schedule_stage(started_ms + braking_at, GlobalStopStage::Braking);
                sim.schedule_stage(started_ms + stopped_at, GlobalStopStage::Completed);
            }
            GlobalStopPhase::Braking { started_ms } => {
                sim.schedule_stage(started_ms + stopped_at, GlobalStopStage::Completed);
            }
        }
        sim
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn content(&self) -> &RailContent {
        &self.content
    }

    pub fn now_ms(&self) -> u64 {
        self.state.meta.now_ms
    }

    pub fn assessment(&self) -> &RiskAssessment {
        &self.assessment
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            now_ms: self.state.meta.now_ms,
            animating: self.state.animating,
            global_stop_active: self.state.global_stop.in_progress(),
            track_offset: self.state.track_offset,
            trains: self.state.trains.clone(),
            signals: self.state.signals.states(),
            stopping: self.state.stopping.iter().cloned().collect(),
            risk: self.assessment.clone(),
        }
    }

    /// Earliest pending timer, if any.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_due()
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Applies one operator command at the current clock.
    ///
    /// Rejected commands change nothing and emit nothing.
    pub fn apply(&mut self, envelope: &CommandEnvelope) -> (CommandOutcome, Vec<EventEnvelope>) {
        let mut events = Vec::new();
        let outcome = match &envelope.command {
            Command::SetSpeed { train_id, speed } => self.set_speed(train_id, *speed, &mut events),
            Command::ToggleAnimation => self.toggle_animation(&mut events),
            Command::StopTrain { train_id } => self.stop_train(train_id, &mut events),
            Command::EmergencyStopAll => self.emergency_stop_all(&mut events),
            Command::CycleSignal { track_id, side } => {
                self.cycle_signal(track_id, *side, &mut events)
            }
        };
        if outcome.is_applied() {
            self.refresh_risk(&mut events);
        }
        (outcome, events)
    }

    /// Fires every timer due at or before `now_ms`, in due order.
    ///
    /// The clock never runs backwards; an earlier `now_ms` fires nothing.
    pub fn advance_to(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = Vec::new();
        while let Some(fired) = self.timers.pop_due(now_ms) {
            self.state.meta.now_ms = self.state.meta.now_ms.max(fired.due_ms);
            self.fire(fired.handle, fired.payload, &mut events);
            self.refresh_risk(&mut events);
        }
        self.state.meta.now_ms = self.state.meta.now_ms.max(now_ms);
        events
    }

    pub fn advance_by(&mut self, delta_ms: u64) -> Vec<EventEnvelope> {
        self.advance_to(self.state.meta.now_ms + delta_ms)
    }

    /// Cancels every timer, staged stop notifications included. The state
    /// stays as it is.
    pub fn shutdown(&mut self) {
        self.timers.cancel_all();
        self.motion_timer = None;
        self.decay_timer = None;
        self.staged_timers.clear();
    }

    // --- Commands ---------------------------------------------------------

    fn set_speed(
        &mut self,
        train_id: &TrainId,
        value: f64,
        events: &mut Vec<EventEnvelope>,
    ) -> CommandOutcome {
        let speed = snap_speed(value, &self.content.constants);
        let Some(trains) = self.state.trains.update(train_id, |t| t.speed = speed) else {
            return CommandOutcome::Rejected(RejectReason::UnknownTrain {
                train_id: train_id.clone(),
            });
        };
        self.state.trains = trains;
        events.push(crate::emit(
            &mut self.state.counters,
            self.state.meta.now_ms,
            Event::SpeedSet {
                train_id: train_id.clone(),
                speed,
            },
        ));
        CommandOutcome::Applied
    }

    fn toggle_animation(&mut self, events: &mut Vec<EventEnvelope>) -> CommandOutcome {
        self.state.animating = !self.state.animating;
        if self.state.animating {
            self.arm_motion();
        } else if let Some(handle) = self.motion_timer.take() {
            self.timers.cancel(handle);
        }
        events.push(crate::emit(
            &mut self.state.counters,
            self.state.meta.now_ms,
            Event::AnimationToggled {
                animating: self.state.animating,
            },
        ));
        CommandOutcome::Applied
    }

    fn stop_train(&mut self, train_id: &TrainId, events: &mut Vec<EventEnvelope>) -> CommandOutcome {
        let outcome = request_train_stop(&mut self.state, self.content.capabilities, train_id, events);
        if outcome.is_applied() {
            self.arm_decay();
        }
        outcome
    }

    fn emergency_stop_all(&mut self, events: &mut Vec<EventEnvelope>) -> CommandOutcome {
        let braking = match begin_global_stop(
            &mut self.state,
            &self.content.constants,
            self.content.capabilities,
            events,
        ) {
            Ok(braking) => braking,
            Err(reason) => return CommandOutcome::Rejected(reason),
        };
        let now = self.state.meta.now_ms;
        let c = &self.content.constants;
        let (braking_at, stopped_at) = (c.braking_notice_delay_ms, c.stopped_notice_delay_ms);
        self.schedule_stage(now + braking_at, GlobalStopStage::Braking);
        self.schedule_stage(now + stopped_at, GlobalStopStage::Completed);
        if !braking.is_empty() {
            self.arm_decay();
        }
        CommandOutcome::Applied
    }

    fn cycle_signal(
        &mut self,
        track_id: &TrackId,
        side: Side,
        events: &mut Vec<EventEnvelope>,
    ) -> CommandOutcome {
        let Some(aspect) = self.state.signals.cycle(track_id, side) else {
            return CommandOutcome::Rejected(RejectReason::UnknownSignal {
                track_id: track_id.clone(),
                side,
            });
        };
        events.push(crate::emit(
            &mut self.state.counters,
            self.state.meta.now_ms,
            Event::SignalUpdated {
                track_id: track_id.clone(),
                side,
                aspect,
            },
        ));
        CommandOutcome::Applied
    }

    // --- Timers -----------------------------------------------------------

    fn arm_motion(&mut self) {
        if self.motion_timer.is_some() {
            return;
        }
        let period = self.content.constants.motion_tick_ms;
        let first = self.state.meta.now_ms + period;
        self.motion_timer = Some(self.timers.schedule_every(first, period, Timer::Motion));
    }

    fn arm_decay(&mut self) {
        if self.decay_timer.is_some() {
            return;
        }
        let period = self.content.constants.stop_decay_tick_ms;
        let first = self.state.meta.now_ms + period;
        self.decay_timer = Some(self.timers.schedule_every(first, period, Timer::StopDecay));
    }

    fn schedule_stage(&mut self, due_ms: u64, stage: GlobalStopStage) {
        let handle = self.timers.schedule_once(due_ms, Timer::GlobalStop(stage));
        self.staged_timers.push(handle);
    }

    fn fire(&mut self, handle: TimerHandle, timer: Timer, events: &mut Vec<EventEnvelope>) {
        match timer {
            Timer::Motion => self.motion_tick(),
            Timer::StopDecay => self.decay_tick(events),
            Timer::GlobalStop(stage) => {
                self.staged_timers.retain(|h| *h != handle);
                advance_global_stop(&mut self.state, stage, events);
            }
        }
    }

    fn motion_tick(&mut self) {
        // Frozen, not reset, while animation is off or a full stop runs.
        if !self.state.animating || self.state.global_stop.in_progress() {
            return;
        }
        let c = &self.content.constants;
        self.state.trains = advance_positions(&self.state.trains, c);
        if self.content.capabilities.track_offset {
            self.state.track_offset = advance_track_offset(self.state.track_offset, c.track_offset_step);
        }
        self.state.meta.motion_ticks += 1;
    }

    fn decay_tick(&mut self, events: &mut Vec<EventEnvelope>) {
        emergency::decay_tick(&mut self.state, &self.content.constants, events);
        self.state.meta.decay_ticks += 1;
        if self.state.stopping.is_empty() {
            if let Some(handle) = self.decay_timer.take() {
                self.timers.cancel(handle);
            }
        }
    }

    fn refresh_risk(&mut self, events: &mut Vec<EventEnvelope>) {
        let assessment = assess(&self.state, &self.content);
        let from = self.assessment.risk_level;
        if assessment.risk_level != from {
            events.push(crate::emit(
                &mut self.state.counters,
                self.state.meta.now_ms,
                Event::RiskChanged {
                    from,
                    to: assessment.risk_level,
                    min_distance_km: assessment.min_distance_km,
                },
            ));
        }
        self.assessment = assessment;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snap_speed_rounds_to_step_and_clamps() {
        let c = Constants::default();
        assert!((snap_speed(72.0, &c) - 70.0).abs() < 1e-9);
        assert!((snap_speed(73.0, &c) - 75.0).abs() < 1e-9);
        assert!((snap_speed(-12.0, &c) - 0.0).abs() < 1e-9);
        assert!((snap_speed(500.0, &c) - 120.0).abs() < 1e-9);
        assert!((snap_speed(f64::NAN, &c) - 0.0).abs() < 1e-9);
    }
}
