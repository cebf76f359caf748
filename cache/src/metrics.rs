use crate::primitives::{LabelIndex, StringSet};
use chrono::{DateTime, Duration, Utc};
use gosight_model::{Meta, Metric, MetricKind, MetricPayload};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Cache-resident record for one fully-qualified metric name.
///
/// `labels` is the queryable superset: dimensions ∪ well-known meta fields ∪
/// user tags. Every pair observed in any ingest for this metric is present.
#[derive(Debug, Clone)]
pub struct MetricEntry {
    pub namespace: String,
    pub subnamespace: String,
    pub name: String,
    pub unit: String,
    pub kind: MetricKind,
    pub dimensions: LabelIndex,
    pub labels: LabelIndex,
    pub tags: LabelIndex,
    pub emitters: StringSet,
}

impl MetricEntry {
    fn new(metric: &Metric) -> Self {
        Self {
            namespace: metric.namespace.to_lowercase(),
            subnamespace: metric.subnamespace.to_lowercase(),
            name: metric.name.to_lowercase(),
            unit: metric.unit.clone(),
            kind: metric.kind,
            dimensions: LabelIndex::new(),
            labels: LabelIndex::new(),
            tags: LabelIndex::new(),
            emitters: StringSet::new(),
        }
    }
}

#[derive(Default)]
struct MetricCacheState {
    entries: HashMap<String, MetricEntry>,
    /// Global union of every entry's labels, kept in sync on add and rebuilt
    /// on prune.
    label_values: LabelIndex,
    endpoint_meta: HashMap<String, Meta>,
    last_seen: HashMap<String, DateTime<Utc>>,
}

/// Index of metric entries by fully-qualified name with per-label value sets
/// and emitting endpoints. Answers the discovery queries (namespaces,
/// dimensions, which metrics carry label k=v) without touching the long-term
/// backend.
pub struct MetricCache {
    state: RwLock<MetricCacheState>,
    retention: Duration,
}

impl Default for MetricCache {
    fn default() -> Self {
        Self::new(Duration::hours(24))
    }
}

impl MetricCache {
    pub fn new(retention: Duration) -> Self {
        Self {
            state: RwLock::new(MetricCacheState::default()),
            retention,
        }
    }

    /// Fold a payload into the index. Never fails; samples without a name are
    /// dropped with a warning.
    pub fn add(&self, payload: &MetricPayload) {
        let endpoint_id = if !payload.endpoint_id.is_empty() {
            payload.endpoint_id.clone()
        } else {
            payload.meta.endpoint_id.clone()
        };
        let meta_labels = payload.meta.labels();

        let mut state = self.state.write();
        let MetricCacheState {
            entries,
            label_values,
            endpoint_meta,
            last_seen,
        } = &mut *state;

        for metric in &payload.metrics {
            let Some(key) = metric.fully_qualified() else {
                warn!(endpoint = %endpoint_id, "dropping metric sample without a name");
                continue;
            };
            let entry = entries.entry(key).or_insert_with(|| MetricEntry::new(metric));

            for (k, v) in &metric.dimensions {
                entry.dimensions.insert(k, v);
                entry.labels.insert(k, v);
                label_values.insert(k, v);
            }
            for (k, v) in &meta_labels {
                entry.labels.insert(k, v);
                label_values.insert(k, v);
            }
            for (k, v) in &payload.meta.tags {
                entry.tags.insert(k, v);
            }
            if !endpoint_id.is_empty() {
                entry.emitters.insert(endpoint_id.clone());
            }
        }

        if !endpoint_id.is_empty() {
            last_seen.insert(endpoint_id.clone(), Utc::now());
            endpoint_meta.insert(endpoint_id, payload.meta.clone());
        }
    }

    pub fn namespaces(&self) -> Vec<String> {
        let state = self.state.read();
        let mut namespaces: Vec<String> = state
            .entries
            .values()
            .map(|entry| entry.namespace.clone())
            .filter(|ns| !ns.is_empty())
            .collect();
        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    pub fn subnamespaces(&self, namespace: &str) -> Vec<String> {
        let state = self.state.read();
        let mut subs: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.namespace == namespace)
            .map(|entry| entry.subnamespace.clone())
            .filter(|sub| !sub.is_empty())
            .collect();
        subs.sort();
        subs.dedup();
        subs
    }

    pub fn metric_names(&self, namespace: &str, subnamespace: &str) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .entries
            .values()
            .filter(|entry| entry.namespace == namespace && entry.subnamespace == subnamespace)
            .map(|entry| entry.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn all_metric_names(&self) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state.entries.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn entry(&self, fq_name: &str) -> Option<MetricEntry> {
        self.state.read().entries.get(fq_name).cloned()
    }

    /// Keys used as a dimension by at least one entry, with every observed
    /// value. Tag-only and meta-only keys are excluded.
    pub fn available_dimensions(&self) -> HashMap<String, Vec<String>> {
        let state = self.state.read();
        let mut union = LabelIndex::new();
        for entry in state.entries.values() {
            for (key, values) in entry.dimensions.iter() {
                for value in values {
                    union.insert(key, value);
                }
            }
        }
        union
            .iter()
            .map(|(key, values)| {
                let mut values: Vec<String> = values.iter().cloned().collect();
                values.sort();
                (key.clone(), values)
            })
            .collect()
    }

    pub fn metric_dimensions(&self, fq_name: &str) -> Vec<String> {
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .entries
            .get(fq_name)
            .map(|entry| entry.dimensions.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Tag keys observed on emitters. Derived from endpoint meta, not from
    /// the label union: tags describe emitters, not metric dimensions.
    pub fn all_tag_keys(&self) -> Vec<String> {
        let state = self.state.read();
        let mut keys: Vec<String> = state
            .endpoint_meta
            .values()
            .flat_map(|meta| meta.tags.keys().cloned())
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    pub fn all_tag_values_for_key(&self, key: &str) -> Vec<String> {
        let state = self.state.read();
        let mut values: Vec<String> = state
            .endpoint_meta
            .values()
            .filter_map(|meta| meta.tags.get(key).cloned())
            .filter(|value| !value.is_empty())
            .collect();
        values.sort();
        values.dedup();
        values
    }

    /// Every value observed for label `key`, optionally filtered by a
    /// case-insensitive substring.
    pub fn label_values(&self, key: &str, contains: Option<&str>) -> Vec<String> {
        let state = self.state.read();
        let needle = contains.map(str::to_lowercase);
        let mut values: Vec<String> = state
            .label_values
            .get(key)
            .map(|set| {
                set.iter()
                    .filter(|value| match &needle {
                        Some(needle) => value.to_lowercase().contains(needle),
                        None => true,
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        values.sort();
        values
    }

    /// Fully-qualified names of every metric whose labels contain all of
    /// `filters` (AND semantics). A missing key on an entry is a miss.
    pub fn metrics_with_labels(&self, filters: &HashMap<String, String>) -> Vec<String> {
        let state = self.state.read();
        let mut names: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, entry)| {
                filters
                    .iter()
                    .all(|(key, value)| entry.labels.contains_pair(key, value))
            })
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn endpoint_meta(&self, endpoint_id: &str) -> Option<Meta> {
        self.state.read().endpoint_meta.get(endpoint_id).cloned()
    }

    pub fn entry_count(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Snapshot of the global label union, consumed by the cardinality audit.
    pub fn label_values_snapshot(&self) -> HashMap<String, StringSet> {
        self.state
            .read()
            .label_values
            .iter()
            .map(|(key, values)| (key.clone(), values.clone()))
            .collect()
    }

    /// Drop endpoints not seen within the retention window, remove them from
    /// every entry's emitter set, and delete entries left without emitters.
    pub fn prune(&self) {
        self.prune_at(Utc::now());
    }

    fn prune_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.retention;
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
            state.last_seen.remove(id);
            state.endpoint_meta.remove(id);
        }
        for entry in state.entries.values_mut() {
            for id in &stale {
                entry.emitters.remove(id);
            }
        }
        let before = state.entries.len();
        state.entries.retain(|_, entry| !entry.emitters.is_empty());

        let mut rebuilt = LabelIndex::new();
        for entry in state.entries.values() {
            for (key, values) in entry.labels.iter() {
                for value in values {
                    rebuilt.insert(key, value);
                }
            }
        }
        state.label_values = rebuilt;

        debug!(
            stale_endpoints = stale.len(),
            dropped_entries = before - state.entries.len(),
            "pruned metric cache"
        );
    }

    #[cfg(test)]
    fn backdate_endpoint(&self, endpoint_id: &str, seen: DateTime<Utc>) {
        self.state
            .write()
            .last_seen
            .insert(endpoint_id.to_string(), seen);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(endpoint: &str, tags: &[(&str, &str)], metric: Metric) -> MetricPayload {
        let mut meta = Meta {
            endpoint_id: endpoint.to_string(),
            hostname: format!("{endpoint}-host"),
            ..Default::default()
        };
        for (key, value) in tags {
            meta.tags.insert(key.to_string(), value.to_string());
        }
        MetricPayload {
            endpoint_id: endpoint.to_string(),
            meta,
            metrics: vec![metric],
            ..Default::default()
        }
    }

    fn requests_metric() -> Metric {
        let mut dimensions = HashMap::new();
        dimensions.insert("route".to_string(), "/api".to_string());
        dimensions.insert("method".to_string(), "GET".to_string());
        Metric {
            namespace: "App".into(),
            subnamespace: "Web".into(),
            name: "Requests".into(),
            dimensions,
            ..Default::default()
        }
    }

    #[test]
    fn label_discovery() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[("env", "prod")], requests_metric()));

        let mut dims = cache.metric_dimensions("app.web.requests");
        dims.sort();
        assert_eq!(dims, vec!["method", "route"]);

        let available = cache.available_dimensions();
        assert!(available.contains_key("route"));
        assert!(available.contains_key("method"));
        assert!(!available.contains_key("env"));

        let mut filters = HashMap::new();
        filters.insert("env".to_string(), "prod".to_string());
        assert_eq!(cache.metrics_with_labels(&filters), vec!["app.web.requests"]);
    }

    #[test]
    fn meta_tags_become_entry_labels() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[("team", "infra")], requests_metric()));

        let entry = cache.entry("app.web.requests").unwrap();
        assert!(entry.labels.contains_pair("team", "infra"));
        assert!(entry.labels.contains_pair("hostname", "ep-1-host"));
        assert!(entry.labels.contains_pair("route", "/api"));
        assert!(entry.tags.contains_pair("team", "infra"));
        assert!(entry.emitters.contains("ep-1"));
    }

    #[test]
    fn names_are_lowercased_at_ingest() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[], requests_metric()));

        assert_eq!(cache.namespaces(), vec!["app"]);
        assert_eq!(cache.subnamespaces("app"), vec!["web"]);
        assert_eq!(cache.metric_names("app", "web"), vec!["requests"]);
        assert!(cache.metric_names("App", "Web").is_empty());
    }

    #[test]
    fn and_semantics_for_label_filters() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[("env", "prod")], requests_metric()));

        let mut filters = HashMap::new();
        filters.insert("env".to_string(), "prod".to_string());
        filters.insert("zone".to_string(), "us-east-1".to_string());
        assert!(cache.metrics_with_labels(&filters).is_empty());
    }

    #[test]
    fn label_value_filter_is_case_insensitive() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[], requests_metric()));
        let mut metric = requests_metric();
        metric.dimensions.insert("route".into(), "/API/v2".into());
        cache.add(&payload("ep-1", &[], metric));

        let values = cache.label_values("route", Some("api"));
        assert_eq!(values.len(), 2);
        assert!(cache.label_values("route", Some("admin")).is_empty());
    }

    #[test]
    fn malformed_samples_are_dropped() {
        let cache = MetricCache::default();
        cache.add(&payload("ep-1", &[], Metric::default()));
        assert_eq!(cache.entry_count(), 0);
        // Endpoint bookkeeping still happened.
        assert!(cache.endpoint_meta("ep-1").is_some());
    }

    #[test]
    fn prune_removes_stale_endpoints_and_empty_entries() {
        let cache = MetricCache::new(Duration::hours(1));
        cache.add(&payload("ep-old", &[("env", "prod")], requests_metric()));
        let mut other = requests_metric();
        other.name = "Errors".into();
        cache.add(&payload("ep-new", &[], other));

        // ep-old last seen 3700s ago with 1h retention.
        cache.backdate_endpoint("ep-old", Utc::now() - Duration::seconds(3700));
        cache.prune();

        assert!(cache.endpoint_meta("ep-old").is_none());
        assert!(cache.entry("app.web.requests").is_none());
        let survivor = cache.entry("app.web.errors").unwrap();
        assert!(!survivor.emitters.contains("ep-old"));
        // Label union was rebuilt: ep-old's tag is gone.
        assert!(cache.label_values("env", None).is_empty());
    }
}
