use super::*;

fn is_stopped(id: &str) -> impl Fn(&Event) -> bool + '_ {
    move |e: &Event| matches!(e, Event::TrainStopped { train_id } if train_id.0 == id)
}

#[test]
fn test_stop_train_at_72_halts_after_fifteen_decay_ticks() {
    let mut sim = test_sim();
    let (outcome, events) = apply(
        &mut sim,
        Command::StopTrain {
            train_id: train_id("train-a"),
        },
    );
    assert!(outcome.is_applied());
    assert_eq!(
        count_events(&events, |e| matches!(
            e,
            Event::EmergencyActivated { train_id: Some(_) }
        )),
        1
    );

    let events = sim.advance_to(14 * 200);
    assert!((speed_of(&sim, "train-a") - 2.0).abs() < 1e-9);
    assert!(sim.state().stopping.contains(&train_id("train-a")));
    assert_eq!(count_events(&events, is_stopped("train-a")), 0);

    let events = sim.advance_to(15 * 200);
    assert!(speed_of(&sim, "train-a").abs() < 1e-12);
    assert!(
        sim.state().stopping.is_empty(),
        "halted train must leave the stopping set in the same step"
    );
    let stopped: Vec<_> = events
        .iter()
        .filter(|e| is_stopped("train-a")(&e.event))
        .collect();
    assert_eq!(stopped.len(), 1);
    assert_eq!(stopped[0].at_ms, 3000);

    // Nothing left to decay; the timer is gone.
    let later = sim.advance_to(10_000);
    assert_eq!(count_events(&later, is_stopped("train-a")), 0);
}

#[test]
fn test_stop_train_twice_is_idempotent() {
    let mut sim = test_sim();
    let cmd = Command::StopTrain {
        train_id: train_id("train-a"),
    };
    apply(&mut sim, cmd.clone());
    let (outcome, events) = apply(&mut sim, cmd);
    assert!(matches!(
        outcome,
        CommandOutcome::Rejected(RejectReason::AlreadyStopping { .. })
    ));
    assert!(events.is_empty());
    assert_eq!(sim.state().stopping.len(), 1);
}

#[test]
fn test_stop_train_at_standstill_is_rejected() {
    let mut sim = test_sim();
    apply(
        &mut sim,
        Command::SetSpeed {
            train_id: train_id("train-b"),
            speed: 0.0,
        },
    );
    let (outcome, _) = apply(
        &mut sim,
        Command::StopTrain {
            train_id: train_id("train-b"),
        },
    );
    assert!(matches!(
        outcome,
        CommandOutcome::Rejected(RejectReason::AlreadyStopped { .. })
    ));
    assert!(sim.state().stopping.is_empty());
}

#[test]
fn test_stop_train_disabled_by_capability() {
    let mut content = base_content();
    content.capabilities.per_train_stop = false;
    let mut sim = Simulation::new(content);
    let (outcome, _) = apply(
        &mut sim,
        Command::StopTrain {
            train_id: train_id("train-a"),
        },
    );
    assert_eq!(
        outcome,
        CommandOutcome::Rejected(RejectReason::CapabilityDisabled {
            capability: Capability::PerTrainStop
        })
    );
}

#[test]
fn test_speed_forced_to_zero_completes_on_next_decay_tick() {
    let mut sim = test_sim();
    apply(
        &mut sim,
        Command::StopTrain {
            train_id: train_id("train-a"),
        },
    );
    apply(
        &mut sim,
        Command::SetSpeed {
            train_id: train_id("train-a"),
            speed: 0.0,
        },
    );
    assert!(sim.state().stopping.contains(&train_id("train-a")));

    let events = sim.advance_to(200);
    assert!(sim.state().stopping.is_empty());
    assert_eq!(count_events(&events, is_stopped("train-a")), 1);
}

#[test]
fn test_other_trains_keep_speed_during_single_stop() {
    let mut sim = test_sim();
    apply(
        &mut sim,
        Command::StopTrain {
            train_id: train_id("train-a"),
        },
    );
    sim.advance_to(1000);
    assert!((speed_of(&sim, "train-b") - 60.0).abs() < 1e-9);
    assert!((speed_of(&sim, "train-c") - 48.0).abs() < 1e-9);
}

#[test]
fn test_global_stop_narration_is_staged() {
    let mut sim = test_sim();
    let (outcome, events) = apply(&mut sim, Command::EmergencyStopAll);
    assert!(outcome.is_applied());
    assert!(matches!(
        events[0].event,
        Event::EmergencyActivated { train_id: None }
    ));
    assert!(sim.state().global_stop.in_progress());

    let early = sim.advance_to(1999);
    assert_eq!(
        count_events(&early, |e| matches!(e, Event::BrakingInProgress)),
        0
    );

    let braking = sim.advance_to(2000);
    let at: Vec<u64> = braking
        .iter()
        .filter(|e| matches!(e.event, Event::BrakingInProgress))
        .map(|e| e.at_ms)
        .collect();
    assert_eq!(at, vec![2000]);

    let done = sim.advance_to(4000);
    let at: Vec<u64> = done
        .iter()
        .filter(|e| matches!(e.event, Event::AllTrainsStopped))
        .map(|e| e.at_ms)
        .collect();
    assert_eq!(at, vec![4000]);
    assert!(!sim.state().global_stop.in_progress());
}

#[test]
fn test_global_stop_while_active_is_rejected() {
    let mut sim = test_sim();
    apply(&mut sim, Command::EmergencyStopAll);
    sim.advance_to(1000);
    let (outcome, events) = apply(&mut sim, Command::EmergencyStopAll);
    assert_eq!(
        outcome,
        CommandOutcome::Rejected(RejectReason::GlobalStopInProgress)
    );
    assert!(events.is_empty());

    let all = sim.advance_to(5000);
    assert_eq!(
        count_events(&all, |e| matches!(e, Event::AllTrainsStopped)),
        1,
        "one completion per accepted global stop"
    );
}

#[test]
fn test_global_stop_freezes_motion_and_brakes_every_train() {
    let mut sim = test_sim();
    let start = position_of(&sim, "train-a");
    apply(&mut sim, Command::EmergencyStopAll);

    sim.advance_to(3999);
    assert!((position_of(&sim, "train-a") - start).abs() < 1e-12);

    sim.advance_to(4000);
    for id in ["train-a", "train-b", "train-c"] {
        assert!(speed_of(&sim, id).abs() < 1e-12, "{id} should be halted");
    }
    assert!(sim.state().stopping.is_empty());
}

#[test]
fn test_global_stop_without_braking_keeps_speeds() {
    let mut content = base_content();
    content.constants.global_stop_brakes_all = false;
    let mut sim = Simulation::new(content);
    apply(&mut sim, Command::EmergencyStopAll);
    sim.advance_to(4000);
    assert!((speed_of(&sim, "train-a") - 72.0).abs() < 1e-9);
}

#[test]
fn test_global_stop_can_run_again_after_completion() {
    let mut sim = test_sim();
    apply(&mut sim, Command::EmergencyStopAll);
    sim.advance_to(4000);
    let (outcome, _) = apply(&mut sim, Command::EmergencyStopAll);
    assert!(outcome.is_applied());
}

#[test]
fn test_shutdown_cancels_staged_notifications() {
    let mut sim = test_sim();
    apply(&mut sim, Command::EmergencyStopAll);
    sim.shutdown();
    assert_eq!(sim.pending_timers(), 0);
    assert!(sim.next_deadline().is_none());
    let events = sim.advance_to(10_000);
    assert!(events.is_empty(), "no timer may fire after shutdown");
}
