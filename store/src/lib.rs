//! Persistence seams for the GoSight server.
//!
//! The pipeline treats long-term storage as opaque: caches flush through these
//! traits and never learn what sits behind them. The crate ships the rule
//! document store (a single JSON or YAML file) plus in-memory reference
//! implementations used by the standalone binary and by tests.

pub mod error;
pub mod filter;
pub mod memory;
pub mod rules;

pub use error::{Result, StoreError};
pub use filter::{LogFilter, ResourceFilter, ResourceSummary, SortOrder};
pub use memory::{MemoryLogStore, MemoryMetricStore, MemoryResourceStore, MemoryTagStore};
pub use rules::{FileRuleStore, MemoryRuleStore};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gosight_model::{AlertRule, LogEntry, LogPayload, MetricPayload, Resource};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Long-term metric backend. Writes are best-effort and buffered upstream.
#[async_trait]
pub trait MetricStore: Send + Sync {
    async fn write(&self, batch: &[MetricPayload]) -> Result<()>;
}

/// Long-term log backend.
#[async_trait]
pub trait LogStore: Send + Sync {
    async fn write(&self, batch: &[LogPayload]) -> Result<()>;
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>>;
}

/// One persisted endpoint tag pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRecord {
    pub endpoint_id: String,
    pub key: String,
    pub value: String,
}

/// Durable view of the tag cache, keyed by endpoint.
#[async_trait]
pub trait TagStore: Send + Sync {
    /// Replace every persisted tag row for `endpoint_id` with `records`.
    async fn replace_endpoint_tags(&self, endpoint_id: &str, records: &[TagRecord]) -> Result<()>;
    /// Load all rows, used to seed the cache at startup.
    async fn load_all(&self) -> Result<Vec<TagRecord>>;
}

/// Durable resource inventory behind the write-behind resource cache.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn create(&self, resource: &Resource) -> Result<()>;
    async fn get(&self, id: &str) -> Result<Option<Resource>>;
    async fn update(&self, resource: &Resource) -> Result<()>;
    async fn delete(&self, id: &str) -> Result<()>;
    async fn create_batch(&self, resources: &[Resource]) -> Result<()>;
    async fn update_batch(&self, resources: &[Resource]) -> Result<()>;
    async fn list(
        &self,
        filter: &ResourceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Resource>>;
    async fn count(&self) -> Result<usize>;
    /// Substring search over id, name, and display name.
    async fn search(&self, query: &str) -> Result<Vec<Resource>>;
    async fn get_children(&self, id: &str) -> Result<Vec<Resource>>;
    async fn get_parent(&self, id: &str) -> Result<Option<Resource>>;
    async fn get_by_labels(&self, labels: &HashMap<String, String>) -> Result<Vec<Resource>>;
    async fn get_by_tags(&self, tags: &HashMap<String, String>) -> Result<Vec<Resource>>;
    async fn update_labels(&self, id: &str, labels: &HashMap<String, String>) -> Result<()>;
    async fn update_tags(&self, id: &str, tags: &HashMap<String, String>) -> Result<()>;
    async fn update_status(&self, id: &str, status: &str) -> Result<()>;
    async fn update_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()>;
    async fn get_stale_resources(&self, threshold: Duration) -> Result<Vec<Resource>>;
    async fn get_resource_summary(&self) -> Result<ResourceSummary>;
    async fn get_resources_by_kind(&self, kind: &str) -> Result<Vec<Resource>>;
}

/// Alert rule CRUD over a single flat document.
pub trait RuleStore: Send + Sync {
    /// Insert a rule; an empty id is replaced with a generated one. The
    /// stored rule is returned.
    fn add_rule(&self, rule: AlertRule) -> Result<AlertRule>;
    fn update_rule(&self, rule: AlertRule) -> Result<()>;
    fn delete_rule(&self, id: &str) -> Result<()>;
    fn list_rules(&self) -> Result<Vec<AlertRule>>;
    /// Only rules with `enabled == true`.
    fn get_active_rules(&self) -> Result<Vec<AlertRule>>;
    fn get_rule_by_id(&self, id: &str) -> Result<Option<AlertRule>>;
    fn get_rule_by_name(&self, name: &str) -> Result<Option<AlertRule>>;
}
