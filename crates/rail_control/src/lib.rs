use std::collections::BTreeSet;

use rail_core::{
    make_command, Aspect, Command, CommandEnvelope, ConflictParty, OperatorId, RailContent,
    RiskAssessment, Side, SimState, TrackId, TrainId,
};
use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

pub trait CommandSource {
    fn generate_commands(
        &mut self,
        state: &SimState,
        content: &RailContent,
        assessment: &RiskAssessment,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope>;
}

const AUTO_BRAKE_OPERATOR: &str = "auto-signal-response";
const RANDOM_OPERATOR: &str = "random-operator";

/// Automatic signal response:
/// 1. For every conflict closer than the danger distance, request a stop
///    for each endangered train (both trains of a train/train pair), once
///    per conflict episode.
/// 2. Cycle that track's right signal until it shows `Danger`.
///
/// A train becomes eligible again once it no longer appears in a danger
/// conflict.
#[derive(Debug, Default)]
pub struct AutoBrakeController {
    braked: BTreeSet<TrainId>,
}

impl AutoBrakeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trains this controller has braked in the current episode.
    pub fn braked(&self) -> impl Iterator<Item = &TrainId> {
        self.braked.iter()
    }
}

/// Cycles needed to bring `aspect` to `Danger`.
fn cycles_to_danger(aspect: Aspect) -> usize {
    let mut current = aspect;
    let mut cycles = 0;
    while current != Aspect::Danger {
        current = current.next();
        cycles += 1;
    }
    cycles
}

impl CommandSource for AutoBrakeController {
    fn generate_commands(
        &mut self,
        state: &SimState,
        content: &RailContent,
        assessment: &RiskAssessment,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope> {
        let owner = OperatorId(AUTO_BRAKE_OPERATOR.to_string());
        let now = state.meta.now_ms;
        let danger_km = content.constants.danger_distance_km;

        let mut endangered: BTreeSet<(TrainId, TrackId)> = BTreeSet::new();
        for conflict in assessment
            .conflicts
            .iter()
            .filter(|c| c.distance_km < danger_km)
        {
            endangered.insert((conflict.train_id.clone(), conflict.track.clone()));
            // Both sides of a train/train conflict are at risk.
            if let ConflictParty::Train(other) = &conflict.other {
                endangered.insert((other.clone(), conflict.track.clone()));
            }
        }
        self.braked
            .retain(|id| endangered.iter().any(|(train, _)| train == id));

        let mut commands = Vec::new();
        let mut tracks_raised: BTreeSet<&TrackId> = BTreeSet::new();
        for (train_id, track) in &endangered {
            if self.braked.contains(train_id) {
                continue;
            }
            self.braked.insert(train_id.clone());

            let moving = state.trains.get(train_id).is_some_and(|t| t.speed > 0.0);
            if moving && !state.stopping.contains(train_id) {
                commands.push(make_command(
                    &owner,
                    now,
                    next_command_id,
                    Command::StopTrain {
                        train_id: train_id.clone(),
                    },
                ));
            }

            if !tracks_raised.insert(track) {
                continue;
            }
            let Some(aspect) = state.signals.aspect(track, Side::Right) else {
                continue;
            };
            for _ in 0..cycles_to_danger(aspect) {
                commands.push(make_command(
                    &owner,
                    now,
                    next_command_id,
                    Command::CycleSignal {
                        track_id: track.clone(),
                        side: Side::Right,
                    },
                ));
            }
        }
        commands
    }
}

/// Seeded random operator for soak runs: set-speed, cycle-signal and
/// stop-train commands against whatever the state currently holds.
pub struct RandomOperator {
    rng: ChaCha8Rng,
    commands_per_call: usize,
}

impl RandomOperator {
    pub fn new(seed: u64, commands_per_call: usize) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            commands_per_call,
        }
    }

    fn pick_command(&mut self, state: &SimState, content: &RailContent) -> Option<Command> {
        let trains = state.trains.as_slice();
        let signals = state.signals.states();
        match self.rng.gen_range(0..10) {
            0..=5 if !trains.is_empty() => {
                let train = &trains[self.rng.gen_range(0..trains.len())];
                let c = &content.constants;
                // Whole steps only, so the set-point survives snapping unchanged.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let steps = (c.max_speed_kmh / c.speed_step_kmh.max(1.0)).floor() as u32;
                let speed = f64::from(self.rng.gen_range(0..=steps)) * c.speed_step_kmh;
                Some(Command::SetSpeed {
                    train_id: train.id.clone(),
                    speed,
                })
            }
            6..=8 if !signals.is_empty() => {
                let signal = &signals[self.rng.gen_range(0..signals.len())];
                Some(Command::CycleSignal {
                    track_id: signal.track.clone(),
                    side: signal.side,
                })
            }
            _ if !trains.is_empty() => Some(Command::StopTrain {
                train_id: trains[self.rng.gen_range(0..trains.len())].id.clone(),
            }),
            _ => None,
        }
    }
}

impl CommandSource for RandomOperator {
    fn generate_commands(
        &mut self,
        state: &SimState,
        content: &RailContent,
        _assessment: &RiskAssessment,
        next_command_id: &mut u64,
    ) -> Vec<CommandEnvelope> {
        let owner = OperatorId(RANDOM_OPERATOR.to_string());
        let now = state.meta.now_ms;
        (0..self.commands_per_call)
            .filter_map(|_| self.pick_command(state, content))
            .map(|command| make_command(&owner, now, next_command_id, command))
            .collect()
    }
}
