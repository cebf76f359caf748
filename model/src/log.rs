use crate::meta::Meta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Batch of log records streamed by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogPayload {
    pub endpoint_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl Default for LogPayload {
    fn default() -> Self {
        Self {
            endpoint_id: String::new(),
            timestamp: Utc::now(),
            meta: Meta::default(),
            logs: Vec::new(),
        }
    }
}

/// A single log record. `meta` is only present when the entry was emitted by
/// a different source than the surrounding payload (e.g. a container log
/// relayed by a host agent).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default = "new_log_id")]
    pub id: String,
    #[serde(default)]
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub pid: u32,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub fields: HashMap<String, String>,
    #[serde(default)]
    pub tags: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Meta>,
}

fn new_log_id() -> String {
    Uuid::new_v4().to_string()
}

impl Default for LogEntry {
    fn default() -> Self {
        Self {
            id: new_log_id(),
            level: String::new(),
            message: String::new(),
            source: String::new(),
            category: String::new(),
            pid: 0,
            timestamp: Utc::now(),
            fields: HashMap::new(),
            tags: HashMap::new(),
            meta: None,
        }
    }
}

impl LogEntry {
    /// Field selected by a rule expression's `datatype`; defaults to the
    /// message body.
    pub fn field(&self, datatype: &str) -> &str {
        match datatype {
            "level" => &self.level,
            "source" => &self.source,
            _ => &self.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_receive_generated_ids() {
        let entry: LogEntry = serde_json::from_str(r#"{"message":"hello"}"#).unwrap();
        assert!(!entry.id.is_empty());
    }

    #[test]
    fn field_selection_defaults_to_message() {
        let entry = LogEntry {
            level: "error".into(),
            message: "disk full".into(),
            source: "kernel".into(),
            ..Default::default()
        };
        assert_eq!(entry.field("level"), "error");
        assert_eq!(entry.field("source"), "kernel");
        assert_eq!(entry.field("message"), "disk full");
        assert_eq!(entry.field(""), "disk full");
    }
}
