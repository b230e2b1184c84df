//! Scenario loading and validation shared between rail_cli and rail_daemon.

use anyhow::{ensure, Context, Result};
use rail_core::{Capabilities, Constants, RailContent, ScenarioDef, WrapPolicy};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Deserialize)]
struct ScenarioFile {
    content_version: String,
    #[serde(default)]
    capabilities: Capabilities,
    #[serde(flatten)]
    scenario: ScenarioDef,
}

/// Validates loaded content, returning the first authoring error found.
///
/// Catches duplicate ids, trains or markers on tracks that carry no signals,
/// positions and speeds out of range, and timer periods of zero.
pub fn validate_content(content: &RailContent) -> Result<()> {
    validate_constants(&content.constants)?;

    let scenario = &content.scenario;
    let c = &content.constants;

    let mut signal_keys = HashSet::new();
    for signal in &scenario.signals {
        ensure!(
            signal_keys.insert((&signal.track, signal.side)),
            "duplicate {} signal on track '{}'",
            signal.side,
            signal.track
        );
    }
    let tracks: HashSet<_> = scenario.signals.iter().map(|s| &s.track).collect();

    let mut train_ids = HashSet::new();
    for train in &scenario.trains {
        ensure!(!train.id.0.is_empty(), "train with empty id");
        ensure!(train_ids.insert(&train.id), "duplicate train id '{}'", train.id);
        ensure!(
            tracks.contains(&train.track),
            "train '{}' is on unknown track '{}'",
            train.id,
            train.track
        );
        ensure!(
            (0.0..100.0).contains(&train.position),
            "train '{}' position {} outside [0, 100)",
            train.id,
            train.position
        );
        ensure!(
            (0.0..=c.max_speed_kmh).contains(&train.speed),
            "train '{}' speed {} outside [0, {}]",
            train.id,
            train.speed,
            c.max_speed_kmh
        );
        ensure!(
            train.distance_km.is_finite() && train.distance_km >= 0.0,
            "train '{}' distance_km must be a non-negative number",
            train.id
        );
    }

    let mut marker_ids = HashSet::new();
    for marker in &scenario.oncoming {
        ensure!(marker_ids.insert(&marker.id), "duplicate marker id '{}'", marker.id);
        ensure!(
            tracks.contains(&marker.track),
            "marker '{}' is on unknown track '{}'",
            marker.id,
            marker.track
        );
        ensure!(
            (0.0..100.0).contains(&marker.position),
            "marker '{}' position {} outside [0, 100)",
            marker.id,
            marker.position
        );
    }
    Ok(())
}

fn validate_constants(c: &Constants) -> Result<()> {
    ensure!(c.motion_tick_ms > 0, "motion_tick_ms must be positive");
    ensure!(c.stop_decay_tick_ms > 0, "stop_decay_tick_ms must be positive");
    ensure!(c.stop_decay_step_kmh > 0.0, "stop_decay_step_kmh must be positive");
    ensure!(c.speed_step_kmh > 0.0, "speed_step_kmh must be positive");
    ensure!(c.max_speed_kmh > 0.0, "max_speed_kmh must be positive");
    ensure!(c.position_divisor > 0.0, "position_divisor must be positive");
    ensure!(c.km_per_percent > 0.0, "km_per_percent must be positive");
    ensure!(
        c.stopped_notice_delay_ms >= c.braking_notice_delay_ms,
        "stopped_notice_delay_ms must not precede braking_notice_delay_ms"
    );
    ensure!(
        c.danger_distance_km < c.warning_distance_km,
        "danger_distance_km must be below warning_distance_km"
    );
    if let WrapPolicy::Reset { threshold, offset } = c.wrap {
        ensure!(
            threshold > 0.0 && threshold <= 100.0,
            "wrap threshold {threshold} outside (0, 100]"
        );
        ensure!(
            (0.0..100.0).contains(&offset),
            "wrap offset {offset} outside [0, 100)"
        );
    }
    Ok(())
}

/// Loads `constants.json` and `scenario.json` from `content_dir`.
pub fn load_content(content_dir: &str) -> Result<RailContent> {
    let dir = Path::new(content_dir);
    let constants: Constants = serde_json::from_str(
        &std::fs::read_to_string(dir.join("constants.json")).context("reading constants.json")?,
    )
    .context("parsing constants.json")?;
    let scenario_file: ScenarioFile = serde_json::from_str(
        &std::fs::read_to_string(dir.join("scenario.json")).context("reading scenario.json")?,
    )
    .context("parsing scenario.json")?;
    let content = RailContent {
        content_version: scenario_file.content_version,
        scenario: scenario_file.scenario,
        constants,
        capabilities: scenario_file.capabilities,
    };
    validate_content(&content).context("validating content")?;
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rail_core::test_fixtures::{base_content, marker, train};
    use rail_core::Direction;

    fn error_of(content: &RailContent) -> String {
        format!("{:#}", validate_content(content).unwrap_err())
    }

    #[test]
    fn test_valid_content_passes_validation() {
        validate_content(&base_content()).unwrap();
    }

    #[test]
    fn test_duplicate_train_id_rejected() {
        let mut content = base_content();
        let dup = content.scenario.trains[0].clone();
        content.scenario.trains.push(dup);
        assert!(error_of(&content).contains("duplicate train id 'train-a'"));
    }

    #[test]
    fn test_train_on_unknown_track_rejected() {
        let mut content = base_content();
        content.scenario.trains.push(train("train-z", "track-z", 10.0, 0.0));
        assert!(error_of(&content).contains("unknown track 'track-z'"));
    }

    #[test]
    fn test_speed_above_max_rejected() {
        let mut content = base_content();
        content.scenario.trains[1].speed = 150.0;
        assert!(error_of(&content).contains("speed 150"));
    }

    #[test]
    fn test_marker_position_out_of_range_rejected() {
        let mut content = base_content();
        content
            .scenario
            .oncoming
            .push(marker("m-bad", "track-a", 100.0, Direction::Down));
        assert!(error_of(&content).contains("marker 'm-bad'"));
    }

    #[test]
    fn test_zero_timer_period_rejected() {
        let mut content = base_content();
        content.constants.stop_decay_tick_ms = 0;
        assert!(error_of(&content).contains("stop_decay_tick_ms"));
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let mut content = base_content();
        content.constants.danger_distance_km = 3.0;
        assert!(error_of(&content).contains("danger_distance_km"));
    }

    #[test]
    fn test_bad_reset_wrap_rejected() {
        let mut content = base_content();
        content.constants.wrap = WrapPolicy::Reset {
            threshold: 90.0,
            offset: 120.0,
        };
        assert!(error_of(&content).contains("wrap offset"));
    }
}
