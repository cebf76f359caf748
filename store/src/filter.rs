use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sort direction for log queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

/// Query filter accepted by [`crate::LogStore::get_logs`]. All present
/// criteria must hold; absent ones are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub level: String,
    pub source: String,
    pub category: String,
    pub endpoint_id: String,
    pub service: String,
    /// Matches the `user` field attached to the entry.
    pub user: String,
    pub container_id: String,
    pub container_name: String,
    pub tags: HashMap<String, String>,
    pub fields: HashMap<String, String>,
    /// Case-insensitive substring match on the message body.
    pub contains: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: usize,
    pub cursor: usize,
    pub order: SortOrder,
}

/// Query filter for resource listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceFilter {
    pub kind: String,
    pub group: String,
    pub status: String,
    pub environment: String,
    pub owner: String,
}

/// Aggregate counts returned by `get_resource_summary`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceSummary {
    pub total: usize,
    pub by_kind: HashMap<String, usize>,
    pub by_status: HashMap<String, usize>,
}
