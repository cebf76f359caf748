use crate::error::{Result, StoreError};
use crate::filter::{LogFilter, ResourceFilter, ResourceSummary, SortOrder};
use crate::{LogStore, MetricStore, ResourceStore, TagRecord, TagStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gosight_model::{LogEntry, LogPayload, MetricPayload, Resource};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-memory metric sink. Retains the written batches for inspection; the
/// standalone binary uses it in place of a real time-series backend.
#[derive(Default)]
pub struct MemoryMetricStore {
    payloads: Mutex<Vec<MetricPayload>>,
}

impl MemoryMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> usize {
        self.payloads.lock().len()
    }
}

#[async_trait]
impl MetricStore for MemoryMetricStore {
    async fn write(&self, batch: &[MetricPayload]) -> Result<()> {
        self.payloads.lock().extend_from_slice(batch);
        Ok(())
    }
}

struct StoredLog {
    endpoint_id: String,
    entry: LogEntry,
}

/// In-memory log backend with full filter support.
#[derive(Default)]
pub struct MemoryLogStore {
    logs: Mutex<Vec<StoredLog>>,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> usize {
        self.logs.lock().len()
    }
}

fn matches_filter(endpoint_id: &str, entry: &LogEntry, filter: &LogFilter) -> bool {
    if !filter.level.is_empty() && !entry.level.eq_ignore_ascii_case(&filter.level) {
        return false;
    }
    if !filter.source.is_empty() && entry.source != filter.source {
        return false;
    }
    if !filter.category.is_empty() && entry.category != filter.category {
        return false;
    }
    if !filter.endpoint_id.is_empty() && endpoint_id != filter.endpoint_id {
        return false;
    }
    let meta = entry.meta.as_ref();
    if !filter.service.is_empty()
        && meta.map(|m| m.service.as_str()) != Some(filter.service.as_str())
    {
        return false;
    }
    if !filter.container_id.is_empty()
        && meta.map(|m| m.container_id.as_str()) != Some(filter.container_id.as_str())
    {
        return false;
    }
    if !filter.container_name.is_empty()
        && meta.map(|m| m.container_name.as_str()) != Some(filter.container_name.as_str())
    {
        return false;
    }
    if !filter.user.is_empty() && entry.fields.get("user") != Some(&filter.user) {
        return false;
    }
    for (key, value) in &filter.tags {
        if entry.tags.get(key) != Some(value) {
            return false;
        }
    }
    for (key, value) in &filter.fields {
        if entry.fields.get(key) != Some(value) {
            return false;
        }
    }
    if !filter.contains.is_empty()
        && !entry
            .message
            .to_lowercase()
            .contains(&filter.contains.to_lowercase())
    {
        return false;
    }
    if let Some(start) = filter.start {
        if entry.timestamp < start {
            return false;
        }
    }
    if let Some(end) = filter.end {
        if entry.timestamp > end {
            return false;
        }
    }
    true
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn write(&self, batch: &[LogPayload]) -> Result<()> {
        let mut logs = self.logs.lock();
        for payload in batch {
            for entry in &payload.logs {
                let mut entry = entry.clone();
                // Attach the payload meta so per-entry filters keep working.
                if entry.meta.is_none() {
                    entry.meta = Some(payload.meta.clone());
                }
                logs.push(StoredLog {
                    endpoint_id: payload.endpoint_id.clone(),
                    entry,
                });
            }
        }
        Ok(())
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<LogEntry>> {
        let logs = self.logs.lock();
        let mut matched: Vec<LogEntry> = logs
            .iter()
            .filter(|stored| matches_filter(&stored.endpoint_id, &stored.entry, filter))
            .map(|stored| stored.entry.clone())
            .collect();
        match filter.order {
            SortOrder::Asc => matched.sort_by_key(|entry| entry.timestamp),
            SortOrder::Desc => {
                matched.sort_by_key(|entry| std::cmp::Reverse(entry.timestamp))
            }
        }
        let start = filter.cursor.min(matched.len());
        let mut page: Vec<LogEntry> = matched.split_off(start);
        if filter.limit > 0 {
            page.truncate(filter.limit);
        }
        Ok(page)
    }
}

/// In-memory tag rows, endpoint-keyed.
#[derive(Default)]
pub struct MemoryTagStore {
    rows: Mutex<HashMap<String, Vec<TagRecord>>>,
    writes: Mutex<usize>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of replace operations performed, for flush idempotence checks.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }

    pub fn rows_for(&self, endpoint_id: &str) -> Vec<TagRecord> {
        self.rows
            .lock()
            .get(endpoint_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TagStore for MemoryTagStore {
    async fn replace_endpoint_tags(&self, endpoint_id: &str, records: &[TagRecord]) -> Result<()> {
        self.rows
            .lock()
            .insert(endpoint_id.to_string(), records.to_vec());
        *self.writes.lock() += 1;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<TagRecord>> {
        Ok(self.rows.lock().values().flatten().cloned().collect())
    }
}

/// In-memory resource inventory. Write failures can be injected to exercise
/// the write-behind retry path.
#[derive(Default)]
pub struct MemoryResourceStore {
    resources: Mutex<HashMap<String, Resource>>,
    failing: AtomicBool,
    batch_writes: Mutex<usize>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every mutating call returns `StoreError::Unavailable`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn batch_write_count(&self) -> usize {
        *self.batch_writes.lock()
    }

    fn check_available(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn create(&self, resource: &Resource) -> Result<()> {
        self.check_available()?;
        self.resources
            .lock()
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Resource>> {
        Ok(self.resources.lock().get(id).cloned())
    }

    async fn update(&self, resource: &Resource) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        if !resources.contains_key(&resource.id) {
            return Err(StoreError::ResourceNotFound(resource.id.clone()));
        }
        resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.check_available()?;
        self.resources.lock().remove(id);
        Ok(())
    }

    async fn create_batch(&self, batch: &[Resource]) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        for resource in batch {
            resources.insert(resource.id.clone(), resource.clone());
        }
        Ok(())
    }

    async fn update_batch(&self, batch: &[Resource]) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        for resource in batch {
            resources.insert(resource.id.clone(), resource.clone());
        }
        *self.batch_writes.lock() += 1;
        Ok(())
    }

    async fn list(
        &self,
        filter: &ResourceFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Resource>> {
        let resources = self.resources.lock();
        let mut matched: Vec<Resource> = resources
            .values()
            .filter(|resource| {
                (filter.kind.is_empty() || resource.kind == filter.kind)
                    && (filter.group.is_empty() || resource.group == filter.group)
                    && (filter.status.is_empty() || resource.status == filter.status)
                    && (filter.environment.is_empty()
                        || resource.environment == filter.environment)
                    && (filter.owner.is_empty() || resource.owner == filter.owner)
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        let start = offset.min(matched.len());
        let mut page: Vec<Resource> = matched.split_off(start);
        if limit > 0 {
            page.truncate(limit);
        }
        Ok(page)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.resources.lock().len())
    }

    async fn search(&self, query: &str) -> Result<Vec<Resource>> {
        let needle = query.to_lowercase();
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| {
                resource.id.to_lowercase().contains(&needle)
                    || resource.name.to_lowercase().contains(&needle)
                    || resource.display_name.to_lowercase().contains(&needle)
            })
            .cloned()
            .collect())
    }

    async fn get_children(&self, id: &str) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| resource.parent_id == id)
            .cloned()
            .collect())
    }

    async fn get_parent(&self, id: &str) -> Result<Option<Resource>> {
        let resources = self.resources.lock();
        let parent_id = match resources.get(id) {
            Some(resource) if !resource.parent_id.is_empty() => resource.parent_id.clone(),
            _ => return Ok(None),
        };
        Ok(resources.get(&parent_id).cloned())
    }

    async fn get_by_labels(&self, labels: &HashMap<String, String>) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| {
                labels
                    .iter()
                    .all(|(key, value)| resource.labels.get(key) == Some(value))
            })
            .cloned()
            .collect())
    }

    async fn get_by_tags(&self, tags: &HashMap<String, String>) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| {
                tags.iter()
                    .all(|(key, value)| resource.tags.get(key) == Some(value))
            })
            .cloned()
            .collect())
    }

    async fn update_labels(&self, id: &str, labels: &HashMap<String, String>) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        resource.labels = labels.clone();
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn update_tags(&self, id: &str, tags: &HashMap<String, String>) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        resource.tags = tags.clone();
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn update_status(&self, id: &str, status: &str) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        resource.status = status.to_string();
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn update_last_seen(&self, id: &str, last_seen: DateTime<Utc>) -> Result<()> {
        self.check_available()?;
        let mut resources = self.resources.lock();
        let resource = resources
            .get_mut(id)
            .ok_or_else(|| StoreError::ResourceNotFound(id.to_string()))?;
        resource.last_seen = last_seen;
        resource.updated_at = Utc::now();
        Ok(())
    }

    async fn get_stale_resources(&self, threshold: Duration) -> Result<Vec<Resource>> {
        let cutoff = Utc::now() - threshold;
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| resource.last_seen < cutoff)
            .cloned()
            .collect())
    }

    async fn get_resource_summary(&self) -> Result<ResourceSummary> {
        let resources = self.resources.lock();
        let mut summary = ResourceSummary {
            total: resources.len(),
            ..Default::default()
        };
        for resource in resources.values() {
            *summary.by_kind.entry(resource.kind.clone()).or_insert(0) += 1;
            *summary
                .by_status
                .entry(resource.status.clone())
                .or_insert(0) += 1;
        }
        Ok(summary)
    }

    async fn get_resources_by_kind(&self, kind: &str) -> Result<Vec<Resource>> {
        Ok(self
            .resources
            .lock()
            .values()
            .filter(|resource| resource.kind == kind)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_model::Meta;

    #[tokio::test]
    async fn log_filters_apply_conjunctively() {
        let store = MemoryLogStore::new();
        let payload = LogPayload {
            endpoint_id: "ep-1".into(),
            meta: Meta {
                service: "auth".into(),
                ..Default::default()
            },
            logs: vec![
                LogEntry {
                    level: "error".into(),
                    message: "user login failed for bob".into(),
                    source: "auth".into(),
                    ..Default::default()
                },
                LogEntry {
                    level: "info".into(),
                    message: "user login ok".into(),
                    source: "auth".into(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        store.write(&[payload]).await.unwrap();

        let filter = LogFilter {
            level: "error".into(),
            contains: "LOGIN FAILED".into(),
            endpoint_id: "ep-1".into(),
            ..Default::default()
        };
        let matched = store.get_logs(&filter).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert!(matched[0].message.contains("bob"));

        let miss = LogFilter {
            service: "billing".into(),
            ..Default::default()
        };
        assert!(store.get_logs(&miss).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn resource_store_failure_injection() {
        let store = MemoryResourceStore::new();
        let resource = Resource::new("r1", "host");
        store.update_batch(&[resource.clone()]).await.unwrap();
        assert_eq!(store.batch_write_count(), 1);

        store.set_failing(true);
        assert!(store.update_batch(&[resource.clone()]).await.is_err());

        store.set_failing(false);
        store.update_batch(&[resource]).await.unwrap();
        assert_eq!(store.batch_write_count(), 2);
    }

    #[tokio::test]
    async fn parent_lookup_is_a_second_hop() {
        let store = MemoryResourceStore::new();
        let mut host = Resource::new("host-1", "host");
        host.name = "web-01".into();
        let mut container = Resource::new("ctr-1", "container");
        container.parent_id = "host-1".into();
        store.create_batch(&[host, container]).await.unwrap();

        let parent = store.get_parent("ctr-1").await.unwrap().unwrap();
        assert_eq!(parent.id, "host-1");
        let children = store.get_children("host-1").await.unwrap();
        assert_eq!(children.len(), 1);
        assert!(store.get_parent("host-1").await.unwrap().is_none());
    }
}
