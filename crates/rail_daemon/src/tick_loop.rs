use crate::state::AppState;
use std::time::Duration;

/// Idle poll when no timer is pending and the clock is running.
const IDLE_WAIT: Duration = Duration::from_millis(250);

/// Drives the simulation from wall time. Sleeps until the next timer
/// deadline or until a command wakes it, then advances to the current
/// virtual time and broadcasts whatever happened.
pub async fn run_clock_loop(app: AppState) {
    loop {
        let next = app.sim.lock().next_wakeup();
        let wait = match next {
            Some(at_ms) => app.clock.until(at_ms),
            None if app.clock.is_frozen() => None,
            None => Some(IDLE_WAIT),
        };

        match wait {
            Some(duration) => {
                tokio::select! {
                    () = tokio::time::sleep(duration) => {}
                    () = app.wake.notified() => {}
                }
            }
            None => app.wake.notified().await,
        }

        let events = {
            let mut guard = app.sim.lock();
            let now = app.clock.now_ms().max(guard.sim.now_ms());
            guard.advance_to(now)
        };
        if !events.is_empty() {
            tracing::trace!(count = events.len(), "broadcasting events");
            // No subscribers is fine.
            let _ = app.event_tx.send(events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{DaemonState, WallClock};
    use rail_core::test_fixtures::base_content;
    use rail_core::Simulation;

    #[tokio::test]
    async fn loop_broadcasts_timer_events() {
        let daemon = DaemonState::new(Simulation::new(base_content()), 0);
        let app = AppState::new(daemon, WallClock::new(0, 50.0));
        let mut rx = app.event_tx.subscribe();
        app.sim.lock().submit(
            &rail_core::OperatorId("operator".to_string()),
            rail_core::Command::EmergencyStopAll,
        );

        let handle = tokio::spawn(run_clock_loop(app.clone()));
        let batch = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(events) = rx.recv().await {
                    if events
                        .iter()
                        .any(|e| matches!(e.event, rail_core::Event::AllTrainsStopped))
                    {
                        return events;
                    }
                }
            }
        })
        .await
        .expect("all-trains-stopped within the timeout");
        handle.abort();
        assert!(batch.iter().all(|e| e.at_ms <= app.sim.lock().sim.now_ms()));
    }
}
