use rail_core::{MetricsSnapshot, RiskLevel};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum AlertChange {
    Raised {
        alert_id: &'static str,
        severity: AlertSeverity,
        message: &'static str,
        suggested_action: &'static str,
    },
    Cleared {
        alert_id: &'static str,
    },
}

type RuleFn = fn(&VecDeque<MetricsSnapshot>) -> bool;

struct AlertRule {
    id: &'static str,
    severity: AlertSeverity,
    check: RuleFn,
    message: &'static str,
    suggested_action: &'static str,
}

const RULES: &[AlertRule] = &[
    AlertRule {
        id: "COLLISION_RISK",
        severity: AlertSeverity::Critical,
        check: |h| latest(h).is_some_and(|s| s.risk_level == RiskLevel::Danger),
        message: "Separation below danger distance on at least one track",
        suggested_action: "Stop the endangered train and set the track signal to danger",
    },
    AlertRule {
        id: "PROXIMITY_WARNING",
        severity: AlertSeverity::Warning,
        check: |h| h.len() >= 3 && tail(h, 3).iter().all(|s| s.risk_level >= RiskLevel::Warning),
        message: "Separation inside warning distance for 3+ samples",
        suggested_action: "Reduce speed on the affected track",
    },
    AlertRule {
        id: "EMERGENCY_STOP_ACTIVE",
        severity: AlertSeverity::Critical,
        check: |h| latest(h).is_some_and(|s| s.global_stop_active),
        message: "All-trains emergency stop in progress",
        suggested_action: "Wait for the stop sequence to complete before issuing commands",
    },
    AlertRule {
        id: "BRAKING_BACKLOG",
        severity: AlertSeverity::Warning,
        check: |h| latest(h).is_some_and(|s| s.trains_stopping >= 2),
        message: "Several trains under emergency braking at once",
        suggested_action: "Check for a common hazard across tracks",
    },
    AlertRule {
        id: "FLEET_STALLED",
        severity: AlertSeverity::Warning,
        check: |h| {
            h.len() >= 5
                && tail(h, 5).iter().all(|s| {
                    s.trains_total > 0 && s.trains_moving == 0 && !s.global_stop_active
                })
        },
        message: "No train has moved for 5+ samples",
        suggested_action: "Set a speed to resume service",
    },
];

fn latest(h: &VecDeque<MetricsSnapshot>) -> Option<&MetricsSnapshot> {
    h.back()
}

fn tail(h: &VecDeque<MetricsSnapshot>, n: usize) -> Vec<&MetricsSnapshot> {
    h.iter().rev().take(n).collect()
}

#[derive(Debug, Default)]
pub struct AlertEngine {
    active: BTreeSet<&'static str>,
}

impl AlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current active alert ids, sorted.
    pub fn active_alert_ids(&self) -> Vec<String> {
        self.active.iter().map(ToString::to_string).collect()
    }

    /// Evaluate every rule against the metrics history. Returns only changes.
    pub fn evaluate(&mut self, history: &VecDeque<MetricsSnapshot>) -> Vec<AlertChange> {
        let mut changes = Vec::new();
        for rule in RULES {
            let fired = (rule.check)(history);
            let was_active = self.active.contains(rule.id);
            if fired && !was_active {
                self.active.insert(rule.id);
                changes.push(AlertChange::Raised {
                    alert_id: rule.id,
                    severity: rule.severity,
                    message: rule.message,
                    suggested_action: rule.suggested_action,
                });
            } else if !fired && was_active {
                self.active.remove(rule.id);
                changes.push(AlertChange::Cleared { alert_id: rule.id });
            }
        }
        changes
    }
}
