//! Authoritative, immutable train collection.
//!
//! Every tick builds a fresh collection and swaps it in whole, so a
//! [`TrainRegistry`] clone taken for a snapshot never changes underneath
//! its reader.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Train, TrainId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<Train>", into = "Vec<Train>")]
pub struct TrainRegistry {
    trains: Arc<[Train]>,
}

impl From<Vec<Train>> for TrainRegistry {
    fn from(trains: Vec<Train>) -> Self {
        Self {
            trains: trains.into(),
        }
    }
}

impl From<TrainRegistry> for Vec<Train> {
    fn from(registry: TrainRegistry) -> Self {
        registry.trains.to_vec()
    }
}

impl TrainRegistry {
    /// Builds a registry, normalizing every train into range.
    pub fn new(trains: Vec<Train>, max_speed_kmh: f64) -> Self {
        trains
            .into_iter()
            .map(|train| normalized(train, max_speed_kmh))
            .collect::<Vec<_>>()
            .into()
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Train> {
        self.trains.iter()
    }

    pub fn as_slice(&self) -> &[Train] {
        &self.trains
    }

    pub fn get(&self, id: &TrainId) -> Option<&Train> {
        self.trains.iter().find(|train| &train.id == id)
    }

    pub fn contains(&self, id: &TrainId) -> bool {
        self.get(id).is_some()
    }

    /// Returns a new collection with `f` applied to every train.
    #[must_use]
    pub fn map(&self, f: impl FnMut(&Train) -> Train) -> Self {
        self.trains.iter().map(f).collect::<Vec<_>>().into()
    }

    /// Returns a new collection with one train rewritten, or `None` if the
    /// id is unknown.
    pub fn update(&self, id: &TrainId, f: impl FnOnce(&mut Train)) -> Option<Self> {
        let index = self.trains.iter().position(|train| &train.id == id)?;
        let mut trains = self.trains.to_vec();
        f(&mut trains[index]);
        Some(trains.into())
    }

    /// True when both registries are the same allocation.
    pub fn same_collection(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.trains, &other.trains)
    }
}

impl<'a> IntoIterator for &'a TrainRegistry {
    type Item = &'a Train;
    type IntoIter = std::slice::Iter<'a, Train>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Folds any real number into `[0, 100)`. Non-finite input lands at 0.
pub fn normalize_position(position: f64) -> f64 {
    if !position.is_finite() {
        return 0.0;
    }
    let wrapped = position.rem_euclid(100.0);
    // rem_euclid can round up to exactly 100.0 for tiny negative inputs.
    if wrapped >= 100.0 {
        0.0
    } else {
        wrapped
    }
}

/// Clamps a speed into `[0, max_speed_kmh]`. NaN becomes 0.
pub fn clamp_speed(speed: f64, max_speed_kmh: f64) -> f64 {
    if speed.is_nan() {
        return 0.0;
    }
    speed.clamp(0.0, max_speed_kmh)
}

fn normalized(mut train: Train, max_speed_kmh: f64) -> Train {
    train.position = normalize_position(train.position);
    train.speed = clamp_speed(train.speed, max_speed_kmh);
    train.distance_km = train.distance_km.max(0.0);
    train
}
