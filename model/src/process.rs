use crate::meta::Meta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Point-in-time process table reported by an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub endpoint_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub processes: Vec<ProcessInfo>,
}

impl Default for ProcessSnapshot {
    fn default() -> Self {
        Self {
            endpoint_id: String::new(),
            timestamp: Utc::now(),
            meta: Meta::default(),
            processes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: u32,
    pub user: String,
    pub executable: String,
    pub cmdline: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
    pub threads: u32,
    pub start_time: Option<DateTime<Utc>>,
}
