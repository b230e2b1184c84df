//! Operator notifications derived from simulation events.

use serde::Serialize;

use crate::{Event, EventEnvelope, Severity};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub at_ms: u64,
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Where notifications go: a toast queue, a log, a test buffer.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}

impl NotificationSink for Vec<Notification> {
    fn notify(&mut self, notification: Notification) {
        self.push(notification);
    }
}

/// The operator-facing message for an event, if it has one. Speed,
/// animation and risk changes are silent.
pub fn notification_for(envelope: &EventEnvelope) -> Option<Notification> {
    let (title, description, severity) = match &envelope.event {
        Event::EmergencyActivated { train_id: None } => (
            "EMERGENCY STOP ACTIVATED".to_string(),
            "Emergency brake initialization...".to_string(),
            Severity::Destructive,
        ),
        Event::EmergencyActivated {
            train_id: Some(train_id),
        } => (
            format!("EMERGENCY BRAKE: {train_id}"),
            "Applying emergency brake. Speed reducing rapidly.".to_string(),
            Severity::Destructive,
        ),
        Event::BrakingInProgress => (
            "BRAKING IN PROGRESS".to_string(),
            "Slowing vehicle... Speed reducing rapidly.".to_string(),
            Severity::Destructive,
        ),
        Event::TrainStopped { train_id } => (
            "TRAIN STOPPED".to_string(),
            format!("{train_id} has been brought to a complete stop."),
            Severity::Normal,
        ),
        Event::AllTrainsStopped => (
            "VEHICLE STOPPED".to_string(),
            "All trains have been brought to a complete stop safely.".to_string(),
            Severity::Normal,
        ),
        Event::SignalUpdated {
            track_id,
            side,
            aspect,
        } => (
            "SIGNAL UPDATED".to_string(),
            format!(
                "{} {side} signal changed to {aspect}",
                track_id.0.to_uppercase()
            ),
            Severity::Normal,
        ),
        Event::SpeedSet { .. } | Event::AnimationToggled { .. } | Event::RiskChanged { .. } => {
            return None
        }
    };
    Some(Notification {
        at_ms: envelope.at_ms,
        title,
        description,
        severity,
    })
}

/// Forwards every notifying event to `sink`. Returns how many were sent.
pub fn deliver(events: &[EventEnvelope], sink: &mut impl NotificationSink) -> usize {
    let mut sent = 0;
    for notification in events.iter().filter_map(notification_for) {
        sink.notify(notification);
        sent += 1;
    }
    sent
}
