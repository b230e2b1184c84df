//! Per-track, per-side signal aspects.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Aspect, Side, SignalState, TrackId};

impl Aspect {
    /// The only permitted transition out of each aspect.
    pub fn next(self) -> Self {
        match self {
            Aspect::Safe => Aspect::Caution,
            Aspect::Caution => Aspect::Danger,
            Aspect::Danger => Aspect::Safe,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<SignalState>", into = "Vec<SignalState>")]
pub struct SignalController {
    aspects: BTreeMap<(TrackId, Side), Aspect>,
}

impl From<Vec<SignalState>> for SignalController {
    fn from(signals: Vec<SignalState>) -> Self {
        Self::new(signals)
    }
}

impl From<SignalController> for Vec<SignalState> {
    fn from(controller: SignalController) -> Self {
        controller.states()
    }
}

impl SignalController {
    /// Later entries for the same track and side win.
    pub fn new(signals: impl IntoIterator<Item = SignalState>) -> Self {
        let aspects = signals
            .into_iter()
            .map(|s| ((s.track, s.side), s.aspect))
            .collect();
        Self { aspects }
    }

    pub fn aspect(&self, track: &TrackId, side: Side) -> Option<Aspect> {
        self.aspects.get(&(track.clone(), side)).copied()
    }

    /// Advances one signal to its next aspect and returns it. `None` if the
    /// signal does not exist.
    pub fn cycle(&mut self, track: &TrackId, side: Side) -> Option<Aspect> {
        let aspect = self.aspects.get_mut(&(track.clone(), side))?;
        *aspect = aspect.next();
        Some(*aspect)
    }

    /// All signals ordered by track, then left before right.
    pub fn states(&self) -> Vec<SignalState> {
        self.aspects
            .iter()
            .map(|((track, side), aspect)| SignalState {
                track: track.clone(),
                side: *side,
                aspect: *aspect,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.aspects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aspects.is_empty()
    }

    pub fn count(&self, aspect: Aspect) -> usize {
        self.aspects.values().filter(|a| **a == aspect).count()
    }
}
