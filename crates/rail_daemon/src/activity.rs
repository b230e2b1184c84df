use rail_core::{Event, EventEnvelope, Notification, NotificationSink, Severity};
use serde::Serialize;
use std::collections::VecDeque;

pub const ACTIVITY_LOG_LEN: usize = 200;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub at_ms: u64,
    pub message: String,
    pub severity: Severity,
}

/// Recent operator-visible activity, newest last.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<ActivityEntry>,
}

impl ActivityLog {
    pub fn push(&mut self, at_ms: u64, message: String) {
        self.push_entry(ActivityEntry {
            at_ms,
            message,
            severity: Severity::Normal,
        });
    }

    fn push_entry(&mut self, entry: ActivityEntry) {
        if self.entries.len() >= ACTIVITY_LOG_LEN {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.entries.iter()
    }

    /// Logs the events that carry no toast: speed changes, animation
    /// toggles and risk level transitions.
    pub fn record_events(&mut self, events: &[EventEnvelope]) {
        for envelope in events {
            let message = match &envelope.event {
                Event::SpeedSet { train_id, speed } => {
                    format!("{train_id} speed set to {speed:.0} km/h")
                }
                Event::AnimationToggled { animating: true } => "Animation resumed".to_string(),
                Event::AnimationToggled { animating: false } => "Animation paused".to_string(),
                Event::RiskChanged {
                    from,
                    to,
                    min_distance_km,
                } => {
                    let min = min_distance_km.map_or_else(|| "-".to_string(), |d| format!("{d:.2} km"));
                    format!("Risk {from:?} -> {to:?} (min separation {min})")
                }
                _ => continue,
            };
            self.push(envelope.at_ms, message);
        }
    }
}

impl NotificationSink for ActivityLog {
    fn notify(&mut self, notification: Notification) {
        self.push_entry(ActivityEntry {
            at_ms: notification.at_ms,
            message: format!("{}: {}", notification.title, notification.description),
            severity: notification.severity,
        });
    }
}
