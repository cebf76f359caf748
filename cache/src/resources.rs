use crate::primitives::StringSet;
use chrono::{DateTime, Duration, Utc};
use gosight_model::Resource;
use parking_lot::{Mutex, RwLock};
use gosight_store::{ResourceStore, Result as StoreResult, StoreError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tuning knobs for the write-behind flush loop.
#[derive(Debug, Clone)]
pub struct ResourceCacheConfig {
    pub flush_interval: StdDuration,
    pub flush_timeout: StdDuration,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        Self {
            flush_interval: StdDuration::from_secs(30),
            flush_timeout: StdDuration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct ResourceState {
    resources: HashMap<String, Resource>,
    by_kind: HashMap<String, StringSet>,
    by_group: HashMap<String, StringSet>,
    by_labels: HashMap<String, HashMap<String, StringSet>>,
    by_tags: HashMap<String, HashMap<String, StringSet>>,
    by_parent: HashMap<String, StringSet>,
    dirty: StringSet,
}

impl ResourceState {
    fn index(&mut self, resource: &Resource) {
        if !resource.kind.is_empty() {
            self.by_kind
                .entry(resource.kind.clone())
                .or_default()
                .insert(resource.id.clone());
        }
        if !resource.group.is_empty() {
            self.by_group
                .entry(resource.group.clone())
                .or_default()
                .insert(resource.id.clone());
        }
        if !resource.parent_id.is_empty() {
            self.by_parent
                .entry(resource.parent_id.clone())
                .or_default()
                .insert(resource.id.clone());
        }
        for (key, value) in &resource.labels {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.by_labels
                .entry(key.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(resource.id.clone());
        }
        for (key, value) in &resource.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            self.by_tags
                .entry(key.clone())
                .or_default()
                .entry(value.clone())
                .or_default()
                .insert(resource.id.clone());
        }
    }

    fn unindex(&mut self, resource: &Resource) {
        if let Some(ids) = self.by_kind.get_mut(&resource.kind) {
            ids.remove(&resource.id);
            if ids.is_empty() {
                self.by_kind.remove(&resource.kind);
            }
        }
        if let Some(ids) = self.by_group.get_mut(&resource.group) {
            ids.remove(&resource.id);
            if ids.is_empty() {
                self.by_group.remove(&resource.group);
            }
        }
        if let Some(ids) = self.by_parent.get_mut(&resource.parent_id) {
            ids.remove(&resource.id);
            if ids.is_empty() {
                self.by_parent.remove(&resource.parent_id);
            }
        }
        for (key, value) in &resource.labels {
            if let Some(values) = self.by_labels.get_mut(key) {
                if let Some(ids) = values.get_mut(value) {
                    ids.remove(&resource.id);
                    if ids.is_empty() {
                        values.remove(value);
                    }
                }
                if values.is_empty() {
                    self.by_labels.remove(key);
                }
            }
        }
        for (key, value) in &resource.tags {
            if let Some(values) = self.by_tags.get_mut(key) {
                if let Some(ids) = values.get_mut(value) {
                    ids.remove(&resource.id);
                    if ids.is_empty() {
                        values.remove(value);
                    }
                }
                if values.is_empty() {
                    self.by_tags.remove(key);
                }
            }
        }
    }

    fn project(&self, ids: &StringSet) -> Vec<Resource> {
        ids.iter()
            .filter_map(|id| self.resources.get(id).cloned())
            .collect()
    }

    /// Progressive intersection: seed with the first partition, intersect in
    /// place, short-circuit on a missing partition or an empty working set.
    fn intersect(
        index: &HashMap<String, HashMap<String, StringSet>>,
        filters: &HashMap<String, String>,
    ) -> Option<StringSet> {
        let mut candidates: Option<StringSet> = None;
        for (key, value) in filters {
            let ids = index.get(key)?.get(value)?;
            candidates = Some(match candidates {
                None => ids.clone(),
                Some(mut current) => {
                    current.retain(|id| ids.contains(id));
                    current
                }
            });
            if candidates.as_ref().is_some_and(StringSet::is_empty) {
                return None;
            }
        }
        candidates
    }
}

struct Inner {
    state: RwLock<ResourceState>,
    store: Arc<dyn ResourceStore>,
    config: ResourceCacheConfig,
    shutdown: watch::Sender<bool>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

/// Resource inventory index with write-behind persistence.
///
/// Secondary indices hold ids only; queries project through the primary map
/// (`parent_id` is a weak reference, hierarchy traversal is a second lookup).
#[derive(Clone)]
pub struct ResourceCache {
    inner: Arc<Inner>,
}

impl ResourceCache {
    pub fn new(store: Arc<dyn ResourceStore>, config: ResourceCacheConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(ResourceState::default()),
                store,
                config,
                shutdown,
                flush_task: Mutex::new(None),
            }),
        }
    }

    /// Start the periodic flush loop. Idempotent per cache instance.
    pub fn start(&self) {
        let mut slot = self.inner.flush_task.lock();
        if slot.is_some() {
            return;
        }
        let cache = self.clone();
        let mut shutdown = self.inner.shutdown.subscribe();
        let interval = self.inner.config.flush_interval;
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(err) = cache.flush_dirty().await {
                            warn!(error = %err, "resource flush failed; keeping dirty set");
                        }
                    }
                    _ = shutdown.changed() => {
                        debug!("resource flush loop stopping");
                        return;
                    }
                }
            }
        }));
    }

    /// Stop the flush loop and perform a final flush.
    pub async fn stop(&self) {
        let _ = self.inner.shutdown.send(true);
        let task = self.inner.flush_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        if let Err(err) = self.flush_dirty().await {
            warn!(error = %err, "final resource flush failed");
        }
    }

    /// Insert or replace a resource, migrating every secondary index from the
    /// prior version and marking it dirty.
    pub fn upsert(&self, mut resource: Resource) {
        let mut state = self.inner.state.write();
        if let Some(previous) = state.resources.remove(&resource.id) {
            state.unindex(&previous);
            resource.first_seen = previous.first_seen;
            resource.created_at = previous.created_at;
        }
        resource.updated = true;
        resource.updated_at = Utc::now();
        state.index(&resource);
        state.dirty.insert(resource.id.clone());
        state.resources.insert(resource.id.clone(), resource);
    }

    /// Remove a resource from the primary map and every index. Idempotent.
    pub fn delete(&self, id: &str) {
        let mut state = self.inner.state.write();
        if let Some(resource) = state.resources.remove(id) {
            state.unindex(&resource);
        }
        state.dirty.remove(id);
    }

    pub fn get(&self, id: &str) -> Option<Resource> {
        self.inner.state.read().resources.get(id).cloned()
    }

    pub fn get_by_kind(&self, kind: &str) -> Vec<Resource> {
        let state = self.inner.state.read();
        state
            .by_kind
            .get(kind)
            .map(|ids| state.project(ids))
            .unwrap_or_default()
    }

    pub fn get_by_group(&self, group: &str) -> Vec<Resource> {
        let state = self.inner.state.read();
        state
            .by_group
            .get(group)
            .map(|ids| state.project(ids))
            .unwrap_or_default()
    }

    pub fn get_by_parent(&self, parent_id: &str) -> Vec<Resource> {
        let state = self.inner.state.read();
        state
            .by_parent
            .get(parent_id)
            .map(|ids| state.project(ids))
            .unwrap_or_default()
    }

    pub fn get_by_labels(&self, filters: &HashMap<String, String>) -> Vec<Resource> {
        if filters.is_empty() {
            return Vec::new();
        }
        let state = self.inner.state.read();
        ResourceState::intersect(&state.by_labels, filters)
            .map(|ids| state.project(&ids))
            .unwrap_or_default()
    }

    pub fn get_by_tags(&self, filters: &HashMap<String, String>) -> Vec<Resource> {
        if filters.is_empty() {
            return Vec::new();
        }
        let state = self.inner.state.read();
        ResourceState::intersect(&state.by_tags, filters)
            .map(|ids| state.project(&ids))
            .unwrap_or_default()
    }

    pub fn update_last_seen(&self, id: &str, last_seen: DateTime<Utc>) {
        let mut state = self.inner.state.write();
        if let Some(resource) = state.resources.get_mut(id) {
            resource.last_seen = last_seen;
            resource.updated = true;
            resource.updated_at = Utc::now();
            state.dirty.insert(id.to_string());
        }
    }

    pub fn update_status(&self, id: &str, status: &str) {
        let mut state = self.inner.state.write();
        if let Some(resource) = state.resources.get_mut(id) {
            resource.status = status.to_string();
            resource.updated = true;
            resource.updated_at = Utc::now();
            state.dirty.insert(id.to_string());
        }
    }

    pub fn get_stale_resources(&self, threshold: Duration) -> Vec<Resource> {
        let cutoff = Utc::now() - threshold;
        self.inner
            .state
            .read()
            .resources
            .values()
            .filter(|resource| resource.last_seen < cutoff)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.state.read().resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.state.read().resources.is_empty()
    }

    pub fn dirty_len(&self) -> usize {
        self.inner.state.read().dirty.len()
    }

    /// Flush dirty resources to the store.
    ///
    /// The dirty set is snapshotted and swapped for an empty one under the
    /// write lock; the store write happens with no lock held and a deadline.
    /// On success the `updated` flags are cleared best-effort (ids re-dirtied
    /// during the write keep theirs). On failure the snapshot is unioned back
    /// so nothing in memory is ever lost.
    pub async fn flush_dirty(&self) -> StoreResult<usize> {
        let (ids, snapshot): (StringSet, Vec<Resource>) = {
            let mut state = self.inner.state.write();
            if state.dirty.is_empty() {
                return Ok(0);
            }
            let ids = std::mem::take(&mut state.dirty);
            let snapshot = ids
                .iter()
                .filter_map(|id| state.resources.get(id).cloned())
                .collect();
            (ids, snapshot)
        };

        let write = self.inner.store.update_batch(&snapshot);
        let result = match tokio::time::timeout(self.inner.config.flush_timeout, write).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        };

        match result {
            Ok(()) => {
                let mut state = self.inner.state.write();
                for resource in &snapshot {
                    if state.dirty.contains(&resource.id) {
                        continue;
                    }
                    if let Some(live) = state.resources.get_mut(&resource.id) {
                        live.updated = false;
                    }
                }
                info!(flushed = snapshot.len(), "resource cache flushed");
                Ok(snapshot.len())
            }
            Err(err) => {
                let mut state = self.inner.state.write();
                state.dirty.extend(ids);
                Err(err)
            }
        }
    }
}
