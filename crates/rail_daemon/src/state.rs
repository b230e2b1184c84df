use crate::activity::ActivityLog;
use crate::alerts::{AlertChange, AlertEngine};
use parking_lot::Mutex;
use rail_control::CommandSource;
use rail_core::{
    compute_metrics, deliver, make_command, Command, CommandOutcome, EventEnvelope,
    MetricsSnapshot, OperatorId, Simulation,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Notify};

pub const METRICS_HISTORY_LEN: usize = 600;

/// Longest single sleep of the clock loop; it re-reads the deadline after.
pub const MAX_WAIT: Duration = Duration::from_secs(60);

pub struct DaemonState {
    pub sim: Simulation,
    pub controllers: Vec<Box<dyn CommandSource + Send>>,
    pub next_command_id: u64,
    pub metrics_every_ms: u64,
    next_metrics_ms: u64,
    pub metrics_history: VecDeque<MetricsSnapshot>,
    pub alert_engine: AlertEngine,
    pub activity: ActivityLog,
}

impl DaemonState {
    pub fn new(sim: Simulation, metrics_every_ms: u64) -> Self {
        let next_metrics_ms = sim.now_ms();
        Self {
            sim,
            controllers: Vec::new(),
            next_command_id: 0,
            metrics_every_ms,
            next_metrics_ms,
            metrics_history: VecDeque::new(),
            alert_engine: AlertEngine::new(),
            activity: ActivityLog::default(),
        }
    }

    pub fn push_metrics(&mut self, snapshot: MetricsSnapshot) {
        if self.metrics_history.len() >= METRICS_HISTORY_LEN {
            self.metrics_history.pop_front();
        }
        self.metrics_history.push_back(snapshot);
    }

    fn record(&mut self, events: &[EventEnvelope]) {
        deliver(events, &mut self.activity);
        self.activity.record_events(events);
    }

    /// Submits an operator command at the current simulation time.
    pub fn submit(
        &mut self,
        issued_by: &OperatorId,
        command: Command,
    ) -> (CommandOutcome, Vec<EventEnvelope>) {
        let envelope = make_command(
            issued_by,
            self.sim.now_ms(),
            &mut self.next_command_id,
            command,
        );
        let (outcome, events) = self.sim.apply(&envelope);
        self.record(&events);
        (outcome, events)
    }

    /// Moves the simulation to `now_ms`, then lets the controllers react and
    /// samples metrics on their cadence.
    pub fn advance_to(&mut self, now_ms: u64) -> Vec<EventEnvelope> {
        let mut events = self.sim.advance_to(now_ms);

        let mut commands = Vec::new();
        for controller in &mut self.controllers {
            commands.extend(controller.generate_commands(
                self.sim.state(),
                self.sim.content(),
                self.sim.assessment(),
                &mut self.next_command_id,
            ));
        }
        for cmd in &commands {
            let (outcome, produced) = self.sim.apply(cmd);
            if let CommandOutcome::Rejected(reason) = outcome {
                tracing::debug!(command = %cmd.id, issued_by = %cmd.issued_by, "controller command rejected: {reason}");
            }
            events.extend(produced);
        }
        self.record(&events);

        if self.metrics_every_ms > 0 && self.sim.now_ms() >= self.next_metrics_ms {
            let snapshot = compute_metrics(self.sim.state(), self.sim.assessment());
            self.push_metrics(snapshot);
            let changes = self.alert_engine.evaluate(&self.metrics_history);
            self.record_alerts(&changes);
            self.next_metrics_ms = self.sim.now_ms() + self.metrics_every_ms;
        }
        events
    }

    fn record_alerts(&mut self, changes: &[AlertChange]) {
        let now = self.sim.now_ms();
        for change in changes {
            match change {
                AlertChange::Raised {
                    alert_id, message, ..
                } => {
                    tracing::warn!(alert = alert_id, "alert raised: {message}");
                    self.activity.push(now, format!("ALERT {alert_id}: {message}"));
                }
                AlertChange::Cleared { alert_id } => {
                    tracing::info!(alert = alert_id, "alert cleared");
                    self.activity.push(now, format!("ALERT {alert_id} cleared"));
                }
            }
        }
    }

    /// The next virtual instant the daemon must wake for: the earliest timer
    /// or the next metrics sample, whichever is first.
    pub fn next_wakeup(&self) -> Option<u64> {
        let metrics = (self.metrics_every_ms > 0).then_some(self.next_metrics_ms);
        match (self.sim.next_deadline(), metrics) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

pub type SharedSim = Arc<Mutex<DaemonState>>;
pub type EventTx = broadcast::Sender<Vec<EventEnvelope>>;

/// Maps wall time onto the simulation clock.
#[derive(Debug, Clone, Copy)]
pub struct WallClock {
    started: Instant,
    time_scale: f64,
    offset_ms: u64,
}

impl WallClock {
    /// `time_scale <= 0` freezes virtual time at `offset_ms`. A non-finite
    /// scale freezes it too.
    pub fn new(offset_ms: u64, time_scale: f64) -> Self {
        Self {
            started: Instant::now(),
            time_scale: if time_scale.is_finite() { time_scale } else { 0.0 },
            offset_ms,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.time_scale <= 0.0
    }

    pub fn now_ms(&self) -> u64 {
        if self.is_frozen() {
            return self.offset_ms;
        }
        let elapsed = self.started.elapsed().as_secs_f64() * 1000.0 * self.time_scale;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let elapsed_ms = elapsed as u64;
        self.offset_ms + elapsed_ms
    }

    /// Wall-clock wait until virtual time reaches `at_ms`, capped at
    /// [`MAX_WAIT`].
    pub fn until(&self, at_ms: u64) -> Option<Duration> {
        if self.is_frozen() {
            return None;
        }
        let remaining = at_ms.saturating_sub(self.now_ms());
        #[allow(clippy::cast_precision_loss)]
        let wall = remaining as f64 / self.time_scale;
        let wait = Duration::try_from_secs_f64(wall / 1000.0).unwrap_or(MAX_WAIT);
        Some(wait.min(MAX_WAIT))
    }
}

/// Parses `--time-scale`: finite and not negative.
pub fn parse_time_scale(raw: &str) -> Result<f64, String> {
    let scale: f64 = raw.parse().map_err(|err| format!("{err}"))?;
    if !scale.is_finite() || scale < 0.0 {
        return Err(format!("time scale must be a finite number >= 0, got {raw}"));
    }
    Ok(scale)
}

#[derive(Clone)]
pub struct AppState {
    pub sim: SharedSim,
    pub event_tx: EventTx,
    pub wake: Arc<Notify>,
    pub clock: WallClock,
}

impl AppState {
    pub fn new(daemon: DaemonState, clock: WallClock) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            sim: Arc::new(Mutex::new(daemon)),
            event_tx,
            wake: Arc::new(Notify::new()),
            clock,
        }
    }
}
