use super::*;

#[test]
fn test_base_scenario_starts_safe() {
    let sim = test_sim();
    let risk = sim.assessment();
    assert_eq!(risk.risk_level, RiskLevel::Safe);
    assert!((risk.min_distance_km.unwrap() - 2.5).abs() < 1e-9);
    assert_eq!(risk.conflicts.len(), 2);
    assert!(risk.zones.is_empty());
}

#[test]
fn test_closing_pair_raises_risk_change_event() {
    let mut content = base_content();
    let mut down = train("train-b", "track-a", 52.0, 0.0);
    down.direction = Direction::Down;
    content.scenario.trains = vec![train("train-a", "track-a", 40.0, 120.0), down];
    content.scenario.oncoming.clear();
    let mut sim = Simulation::new(content);
    assert_eq!(sim.assessment().risk_level, RiskLevel::Safe);
    assert_eq!(sim.assessment().zones[0].severity, ZoneSeverity::Warning);

    let events = sim.advance_to(1_000);
    let changes: Vec<_> = events
        .iter()
        .filter_map(|e| match &e.event {
            Event::RiskChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![(RiskLevel::Safe, RiskLevel::Danger)]);
    assert_eq!(sim.snapshot().risk.risk_level, RiskLevel::Danger);
}

#[test]
fn test_near_marker_on_up_track_sets_warning() {
    let mut content = base_content();
    content
        .scenario
        .oncoming
        .push(marker("oncoming-near", "track-b", 35.0, Direction::Down));
    let sim = Simulation::new(content);
    let risk = sim.assessment();
    assert_eq!(risk.risk_level, RiskLevel::Warning);
    assert!((risk.min_distance_km.unwrap() - 1.5).abs() < 1e-9);
}

#[test]
fn test_empty_scenario_is_safe_without_minimum() {
    let mut content = base_content();
    content.scenario.trains.clear();
    content.scenario.oncoming.clear();
    let sim = Simulation::new(content);
    assert_eq!(sim.assessment().risk_level, RiskLevel::Safe);
    assert!(sim.assessment().min_distance_km.is_none());
}
