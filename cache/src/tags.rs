use crate::primitives::StringSet;
use chrono::{Duration, Utc};
use gosight_model::MetricPayload;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use gosight_store::{Result as StoreResult, TagRecord, TagStore};

fn reverse_key(key: &str, value: &str) -> String {
    format!("{key}:{value}")
}

#[derive(Default)]
struct TagCacheState {
    endpoints: HashMap<String, HashMap<String, StringSet>>,
    tag_keys: StringSet,
    tag_values: HashMap<String, StringSet>,
    tag_to_endpoints: HashMap<String, StringSet>,
    last_seen: HashMap<String, i64>,
    dirty: StringSet,
}

/// Endpoint-centric tag index: forward (endpoint → key → values) and reverse
/// (key:value → endpoints), with dirty tracking for the periodic flush.
pub struct TagCache {
    state: RwLock<TagCacheState>,
    retention: Duration,
}

impl Default for TagCache {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl TagCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: RwLock::new(TagCacheState::default()),
            retention,
        }
    }

    /// Record the payload's user tags. Payloads without tags are ignored;
    /// empty values are skipped.
    pub fn add(&self, payload: &MetricPayload) {
        if payload.meta.tags.is_empty() {
            return;
        }
        let endpoint_id = if !payload.endpoint_id.is_empty() {
            payload.endpoint_id.as_str()
        } else {
            payload.meta.endpoint_id.as_str()
        };
        if endpoint_id.is_empty() {
            return;
        }

        let mut state = self.state.write();
        for (key, value) in &payload.meta.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            state
                .endpoints
                .entry(endpoint_id.to_string())
                .or_default()
                .entry(key.clone())
                .or_default()
                .insert(value.clone());
            state.tag_keys.insert(key.clone());
            state
                .tag_values
                .entry(key.clone())
                .or_default()
                .insert(value.clone());
            state
                .tag_to_endpoints
                .entry(reverse_key(key, value))
                .or_default()
                .insert(endpoint_id.to_string());
        }
        state
            .last_seen
            .insert(endpoint_id.to_string(), Utc::now().timestamp());
        state.dirty.insert(endpoint_id.to_string());
    }

    /// Deep copy of the forward view for one endpoint.
    pub fn tags_for_endpoint(&self, endpoint_id: &str) -> HashMap<String, StringSet> {
        self.state
            .read()
            .endpoints
            .get(endpoint_id)
            .cloned()
            .unwrap_or_default()
    }

    /// One value per key, keys normalised for downstream label naming rules:
    /// lowercase, spaces replaced with underscores. The smallest value is
    /// chosen so the view is stable across calls.
    pub fn flattened_tags_for_endpoint(&self, endpoint_id: &str) -> HashMap<String, String> {
        let state = self.state.read();
        let Some(tags) = state.endpoints.get(endpoint_id) else {
            return HashMap::new();
        };
        tags.iter()
            .filter_map(|(key, values)| {
                let value = values.iter().min()?;
                let normalised = key.to_lowercase().replace(' ', "_");
                Some((normalised, value.clone()))
            })
            .collect()
    }

    pub fn tag_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.read().tag_keys.iter().cloned().collect();
        keys.sort();
        keys
    }

    pub fn values_for_key(&self, key: &str) -> Vec<String> {
        let mut values: Vec<String> = self
            .state
            .read()
            .tag_values
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Endpoints carrying tag `key=value`, resolved through the reverse index.
    pub fn endpoints_with_tag(&self, key: &str, value: &str) -> StringSet {
        self.state
            .read()
            .tag_to_endpoints
            .get(&reverse_key(key, value))
            .cloned()
            .unwrap_or_default()
    }

    /// Bulk seed at startup. Seeded endpoints are clean: only live mutations
    /// mark dirt.
    pub fn load_from_store(&self, records: &[TagRecord]) {
        let mut state = self.state.write();
        let now = Utc::now().timestamp();
        for record in records {
            if record.key.is_empty() || record.value.is_empty() || record.endpoint_id.is_empty() {
                continue;
            }
            state
                .endpoints
                .entry(record.endpoint_id.clone())
                .or_default()
                .entry(record.key.clone())
                .or_default()
                .insert(record.value.clone());
            state.tag_keys.insert(record.key.clone());
            state
                .tag_values
                .entry(record.key.clone())
                .or_default()
                .insert(record.value.clone());
            state
                .tag_to_endpoints
                .entry(reverse_key(&record.key, &record.value))
                .or_default()
                .insert(record.endpoint_id.clone());
            state.last_seen.entry(record.endpoint_id.clone()).or_insert(now);
        }
    }

    /// Persist dirty endpoints. On success the flushed ids leave the dirty
    /// set (ids dirtied during the write stay); on failure the set is
    /// retained untouched for the next tick.
    pub async fn flush(&self, store: &dyn TagStore) -> StoreResult<usize> {
        let snapshot: Vec<(String, Vec<TagRecord>)> = {
            let state = self.state.read();
            state
                .dirty
                .iter()
                .map(|endpoint_id| {
                    let records = state
                        .endpoints
                        .get(endpoint_id)
                        .map(|tags| {
                            tags.iter()
                                .flat_map(|(key, values)| {
                                    values.iter().map(move |value| TagRecord {
                                        endpoint_id: endpoint_id.clone(),
                                        key: key.clone(),
                                        value: value.clone(),
                                    })
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    (endpoint_id.clone(), records)
                })
                .collect()
        };
        if snapshot.is_empty() {
            return Ok(0);
        }

        for (endpoint_id, records) in &snapshot {
            store.replace_endpoint_tags(endpoint_id, records).await?;
        }

        let mut state = self.state.write();
        for (endpoint_id, _) in &snapshot {
            state.dirty.remove(endpoint_id);
        }
        debug!(endpoints = snapshot.len(), "flushed endpoint tags");
        Ok(snapshot.len())
    }

    /// Drop endpoints whose last activity is older than the retention window
    /// and rebuild the derived indices.
    pub fn prune(&self) {
        let cutoff = (Utc::now() - self.retention).timestamp();
        let mut state = self.state.write();
        let stale: Vec<String> = state
            .last_seen
            .iter()
            .filter(|(_, seen)| **seen < cutoff)
            .map(|(id, _)| id.clone())
            .collect();
        if stale.is_empty() {
            return;
        }
        for id in &stale {
            state.endpoints.remove(id);
            state.last_seen.remove(id);
            state.dirty.remove(id);
        }

        let mut tag_keys = StringSet::new();
        let mut tag_values: HashMap<String, StringSet> = HashMap::new();
        let mut tag_to_endpoints: HashMap<String, StringSet> = HashMap::new();
        for (endpoint_id, tags) in &state.endpoints {
            for (key, values) in tags {
                tag_keys.insert(key.clone());
                for value in values {
                    tag_values.entry(key.clone()).or_default().insert(value.clone());
                    tag_to_endpoints
                        .entry(reverse_key(key, value))
                        .or_default()
                        .insert(endpoint_id.clone());
                }
            }
        }
        state.tag_keys = tag_keys;
        state.tag_values = tag_values;
        state.tag_to_endpoints = tag_to_endpoints;
    }

    pub fn dirty_len(&self) -> usize {
        self.state.read().dirty.len()
    }

    /// Snapshot of key → values, consumed by the cardinality audit.
    pub fn tag_values_snapshot(&self) -> HashMap<String, StringSet> {
        self.state.read().tag_values.clone()
    }

    #[cfg(test)]
    fn backdate_endpoint(&self, endpoint_id: &str, seen: i64) {
        self.state
            .write()
            .last_seen
            .insert(endpoint_id.to_string(), seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_model::Meta;
    use gosight_store::MemoryTagStore;

    fn tagged_payload(endpoint: &str, tags: &[(&str, &str)]) -> MetricPayload {
        let mut meta = Meta::default();
        for (key, value) in tags {
            meta.tags.insert(key.to_string(), value.to_string());
        }
        MetricPayload {
            endpoint_id: endpoint.to_string(),
            meta,
            ..Default::default()
        }
    }

    #[test]
    fn forward_and_reverse_views_agree() {
        let cache = TagCache::default();
        cache.add(&tagged_payload("ep-1", &[("env", "prod"), ("team", "core")]));
        cache.add(&tagged_payload("ep-2", &[("env", "prod")]));

        let tags = cache.tags_for_endpoint("ep-1");
        assert!(tags.get("env").unwrap().contains("prod"));

        let endpoints = cache.endpoints_with_tag("env", "prod");
        assert_eq!(endpoints.len(), 2);
        assert_eq!(cache.endpoints_with_tag("team", "core").len(), 1);
        assert_eq!(cache.tag_keys(), vec!["env", "team"]);
    }

    #[test]
    fn empty_values_are_skipped() {
        let cache = TagCache::default();
        cache.add(&tagged_payload("ep-1", &[("env", "")]));
        assert!(cache.tags_for_endpoint("ep-1").is_empty());
        assert_eq!(cache.dirty_len(), 1);
    }

    #[test]
    fn flattened_view_normalises_keys() {
        let cache = TagCache::default();
        cache.add(&tagged_payload("ep-1", &[("Cost Center", "42"), ("env", "prod")]));

        let flat = cache.flattened_tags_for_endpoint("ep-1");
        assert_eq!(flat.get("cost_center").map(String::as_str), Some("42"));
        assert_eq!(flat.get("env").map(String::as_str), Some("prod"));
    }

    #[tokio::test]
    async fn flush_persists_only_dirty_endpoints() {
        let cache = TagCache::default();
        let store = MemoryTagStore::new();

        cache.add(&tagged_payload("ep-1", &[("env", "prod")]));
        assert_eq!(cache.flush(&store).await.unwrap(), 1);
        assert_eq!(cache.dirty_len(), 0);
        assert_eq!(store.rows_for("ep-1").len(), 1);

        // Nothing changed: the second flush writes nothing.
        assert_eq!(cache.flush(&store).await.unwrap(), 0);
        assert_eq!(store.write_count(), 1);
    }

    #[test]
    fn seeded_endpoints_are_clean() {
        let cache = TagCache::default();
        cache.load_from_store(&[TagRecord {
            endpoint_id: "ep-1".into(),
            key: "env".into(),
            value: "prod".into(),
        }]);
        assert_eq!(cache.dirty_len(), 0);
        assert_eq!(cache.values_for_key("env"), vec!["prod"]);
    }

    #[test]
    fn prune_rebuilds_reverse_indices() {
        let cache = TagCache::new(Duration::hours(1));
        cache.add(&tagged_payload("ep-old", &[("env", "prod")]));
        cache.add(&tagged_payload("ep-new", &[("env", "staging")]));
        cache.backdate_endpoint("ep-old", (Utc::now() - Duration::seconds(3700)).timestamp());

        cache.prune();

        assert!(cache.tags_for_endpoint("ep-old").is_empty());
        assert!(cache.endpoints_with_tag("env", "prod").is_empty());
        assert_eq!(cache.values_for_key("env"), vec!["staging"]);
    }
}
