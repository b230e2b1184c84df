//! `rail_core`: deterministic train dashboard simulation.
//!
//! No IO, no wall clock. Time only moves when the host calls
//! [`Simulation::advance_to`].

pub mod collision;
mod emergency;
mod engine;
pub mod metrics;
pub mod motion;
pub mod notify;
mod registry;
pub mod scheduler;
mod signals;
mod types;

pub use collision::evaluate;
pub use emergency::ticks_to_halt;
pub use engine::{initial_state, snap_speed, Simulation};
pub use metrics::{compute_metrics, write_metrics_csv, MetricsFileWriter, MetricsSnapshot};
pub use notify::{deliver, notification_for, Notification, NotificationSink};
pub use registry::{clamp_speed, normalize_position, TrainRegistry};
pub use signals::SignalController;
pub use types::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_fixtures;

pub(crate) fn emit(counters: &mut Counters, at_ms: u64, event: Event) -> EventEnvelope {
    let id = EventId(format!("evt_{:06}", counters.next_event_id));
    counters.next_event_id += 1;
    EventEnvelope { id, at_ms, event }
}

/// Wraps a command for submission, allocating `cmd_NNNNNN` ids from `next_id`.
pub fn make_command(
    issued_by: &OperatorId,
    issued_at_ms: u64,
    next_id: &mut u64,
    command: Command,
) -> CommandEnvelope {
    let id = CommandId(format!("cmd_{:06}", *next_id));
    *next_id += 1;
    CommandEnvelope {
        id,
        issued_by: issued_by.clone(),
        issued_at_ms,
        command,
    }
}

#[cfg(test)]
mod tests;
