//! Collision-risk evaluation.
//!
//! Recomputed from scratch after every state change; a single
//! O(trains × (trains + markers)) scan.

use crate::{
    Capabilities, CollisionZone, Conflict, ConflictParty, Constants, Direction, OncomingMarker,
    RiskAssessment, RiskLevel, Train, ZoneSeverity,
};

/// Distance from the reference point to an oncoming marker.
pub fn marker_distance_km(marker: &OncomingMarker, constants: &Constants) -> f64 {
    (constants.reference_position - marker.position).abs() * constants.km_per_percent
}

pub fn train_gap_km(a: &Train, b: &Train, constants: &Constants) -> f64 {
    (a.position - b.position).abs() * constants.km_per_percent
}

/// Risk tier for a minimum separation. `danger_pair` forces `Danger`.
pub fn classify(min_distance_km: Option<f64>, danger_pair: bool, constants: &Constants) -> RiskLevel {
    if danger_pair {
        return RiskLevel::Danger;
    }
    match min_distance_km {
        Some(d) if d < constants.danger_distance_km => RiskLevel::Danger,
        Some(d) if d < constants.warning_distance_km => RiskLevel::Warning,
        _ => RiskLevel::Safe,
    }
}

pub fn evaluate(
    trains: &[Train],
    oncoming: &[OncomingMarker],
    constants: &Constants,
    capabilities: Capabilities,
) -> RiskAssessment {
    let mut min_distance: Option<f64> = None;
    let mut observe = |d: f64| {
        min_distance = Some(min_distance.map_or(d, |m: f64| m.min(d)));
    };

    for train in trains {
        observe(train.distance_km);
    }
    for train in trains.iter().filter(|t| t.direction == Direction::Up) {
        for marker in oncoming.iter().filter(|m| m.track == train.track) {
            observe(marker_distance_km(marker, constants));
        }
    }

    let conflicts = find_conflicts(trains, oncoming, constants);
    let danger_pair = conflicts
        .iter()
        .any(|c| c.distance_km < constants.danger_distance_km);
    let zones = if capabilities.collision_zones {
        derive_zones(&conflicts, trains, oncoming, constants)
    } else {
        Vec::new()
    };

    RiskAssessment {
        risk_level: classify(min_distance, danger_pair, constants),
        min_distance_km: min_distance,
        conflicts,
        zones,
    }
}

/// Every same-track, opposite-direction pairing, trains in registry order.
fn find_conflicts(
    trains: &[Train],
    oncoming: &[OncomingMarker],
    constants: &Constants,
) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for (i, train) in trains.iter().enumerate() {
        for other in &trains[i + 1..] {
            if other.track == train.track && other.direction == train.direction.opposite() {
                conflicts.push(Conflict {
                    track: train.track.clone(),
                    train_id: train.id.clone(),
                    other: ConflictParty::Train(other.id.clone()),
                    distance_km: train_gap_km(train, other, constants),
                });
            }
        }
        for marker in oncoming {
            if marker.track == train.track && marker.direction == train.direction.opposite() {
                conflicts.push(Conflict {
                    track: train.track.clone(),
                    train_id: train.id.clone(),
                    other: ConflictParty::Oncoming(marker.id.clone()),
                    distance_km: marker_distance_km(marker, constants),
                });
            }
        }
    }
    conflicts
}

fn derive_zones(
    conflicts: &[Conflict],
    trains: &[Train],
    oncoming: &[OncomingMarker],
    constants: &Constants,
) -> Vec<CollisionZone> {
    conflicts
        .iter()
        .filter_map(|conflict| {
            let severity = if conflict.distance_km < constants.danger_distance_km {
                ZoneSeverity::Danger
            } else if conflict.distance_km < constants.warning_distance_km {
                ZoneSeverity::Warning
            } else {
                return None;
            };
            let train = trains.iter().find(|t| t.id == conflict.train_id)?;
            let other_position = match &conflict.other {
                ConflictParty::Train(id) => trains.iter().find(|t| &t.id == id)?.position,
                ConflictParty::Oncoming(id) => oncoming.iter().find(|m| &m.id == id)?.position,
            };
            Some(CollisionZone {
                track: conflict.track.clone(),
                start: train.position.min(other_position),
                end: train.position.max(other_position),
                severity,
            })
        })
        .collect()
}
