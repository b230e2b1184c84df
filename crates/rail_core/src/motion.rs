//! Position advance for the motion tick.

use crate::registry::{normalize_position, TrainRegistry};
use crate::{Constants, Train, WrapPolicy};

/// Re-enters a position that ran past the end of the track.
pub fn wrap_position(position: f64, policy: WrapPolicy) -> f64 {
    match policy {
        WrapPolicy::Modulo => normalize_position(position),
        WrapPolicy::Reset { threshold, offset } if position > threshold => {
            normalize_position(offset)
        }
        WrapPolicy::Reset { .. } => normalize_position(position),
    }
}

pub fn advance_train(train: &Train, constants: &Constants) -> Train {
    let step = train.speed / constants.position_divisor;
    Train {
        position: wrap_position(train.position + step, constants.wrap),
        ..train.clone()
    }
}

/// One motion tick over the whole fleet. Returns a new collection.
pub fn advance_positions(trains: &TrainRegistry, constants: &Constants) -> TrainRegistry {
    trains.map(|train| advance_train(train, constants))
}

pub fn advance_track_offset(offset: f64, step: f64) -> f64 {
    normalize_position(offset + step)
}
