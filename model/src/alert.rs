use crate::rule::AlertLevel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Observable state of an alert instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    #[default]
    Ok,
}

/// Live alert tracked per (rule, endpoint) pair. Created on the ok→firing
/// transition, refreshed on re-trigger outside cooldown, destroyed once the
/// rule stops matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertInstance {
    pub rule_id: String,
    pub endpoint_id: String,
    pub state: AlertState,
    pub previous: AlertState,
    pub first_fired: DateTime<Utc>,
    pub last_fired: DateTime<Utc>,
    pub last_value: f64,
    pub labels: HashMap<String, String>,
    pub message: String,
    pub level: AlertLevel,
}

impl AlertInstance {
    /// Composite key used by the manager and evaluator state maps.
    pub fn key(rule_id: &str, endpoint_id: &str) -> String {
        format!("{rule_id}|{endpoint_id}")
    }
}

/// Event emitted on a firing or resolved transition (and by the endpoint
/// lifecycle sweep, which raises synthetic down events).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub id: String,
    pub rule_id: String,
    pub endpoint_id: String,
    pub state: AlertState,
    pub level: AlertLevel,
    pub category: String,
    pub source: String,
    pub message: String,
    pub value: f64,
    pub labels: HashMap<String, String>,
    pub timestamp: DateTime<Utc>,
}
