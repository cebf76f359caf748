use crate::metrics::MetricCache;
use crate::primitives::StringSet;
use crate::tags::TagCache;
use serde::Serialize;
use std::collections::HashMap;

/// Value-count threshold past which a key is called out in the report.
const CARDINALITY_WARN_THRESHOLD: usize = 1000;
const EXAMPLE_LIMIT: usize = 5;

/// Per-key cardinality row in the audit report.
#[derive(Debug, Clone, Serialize)]
pub struct LabelCardinality {
    pub label_key: String,
    pub unique_values: usize,
    pub example_values: Vec<String>,
    pub possible_problem: String,
    pub source: String,
}

/// Cardinality and memory-estimation report over the tag and metric caches.
#[derive(Debug, Clone, Serialize)]
pub struct CacheAuditReport {
    pub tag_cache: Vec<LabelCardinality>,
    pub metric_cache: Vec<LabelCardinality>,
    /// Keys indexed by both caches; candidates for consolidation.
    pub redundant_keys: Vec<String>,
    pub tag_cache_estimated_kb: f64,
    pub metric_cache_estimated_kb: f64,
}

fn examples(values: &StringSet) -> Vec<String> {
    let mut examples: Vec<String> = values.iter().cloned().collect();
    examples.sort();
    examples.truncate(EXAMPLE_LIMIT);
    examples
}

/// Memory estimate: UTF-8 code points across every key and value.
fn estimated_chars(index: &HashMap<String, StringSet>) -> usize {
    index
        .iter()
        .map(|(key, values)| {
            key.chars().count() + values.iter().map(|v| v.chars().count()).sum::<usize>()
        })
        .sum()
}

pub fn audit_caches(tag_cache: &TagCache, metric_cache: &MetricCache) -> CacheAuditReport {
    let tag_index = tag_cache.tag_values_snapshot();
    let label_index = metric_cache.label_values_snapshot();

    let mut tag_rows: Vec<LabelCardinality> = tag_index
        .iter()
        .map(|(key, values)| LabelCardinality {
            label_key: key.clone(),
            unique_values: values.len(),
            example_values: examples(values),
            possible_problem: if values.len() > CARDINALITY_WARN_THRESHOLD {
                "Too many values for tag key".to_string()
            } else {
                String::new()
            },
            source: "tag".to_string(),
        })
        .collect();
    tag_rows.sort_by(|a, b| a.label_key.cmp(&b.label_key));

    let mut metric_rows: Vec<LabelCardinality> = label_index
        .iter()
        .map(|(key, values)| LabelCardinality {
            label_key: key.clone(),
            unique_values: values.len(),
            example_values: examples(values),
            possible_problem: if values.len() > CARDINALITY_WARN_THRESHOLD {
                "High label cardinality".to_string()
            } else {
                String::new()
            },
            source: if tag_index.contains_key(key) {
                "tag".to_string()
            } else {
                "meta".to_string()
            },
        })
        .collect();
    metric_rows.sort_by(|a, b| a.label_key.cmp(&b.label_key));

    let mut redundant_keys: Vec<String> = label_index
        .keys()
        .filter(|key| tag_index.contains_key(*key))
        .cloned()
        .collect();
    redundant_keys.sort();

    CacheAuditReport {
        tag_cache_estimated_kb: estimated_chars(&tag_index) as f64 / 1024.0,
        metric_cache_estimated_kb: estimated_chars(&label_index) as f64 / 1024.0,
        tag_cache: tag_rows,
        metric_cache: metric_rows,
        redundant_keys,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_model::{Meta, Metric, MetricPayload};

    fn seed() -> (TagCache, MetricCache) {
        let tag_cache = TagCache::default();
        let metric_cache = MetricCache::default();

        let mut meta = Meta {
            endpoint_id: "ep-1".into(),
            ..Default::default()
        };
        meta.tags.insert("env".into(), "prod".into());
        let mut dimensions = HashMap::new();
        dimensions.insert("route".to_string(), "/api".to_string());
        let payload = MetricPayload {
            endpoint_id: "ep-1".into(),
            meta,
            metrics: vec![Metric {
                namespace: "app".into(),
                subnamespace: "web".into(),
                name: "requests".into(),
                dimensions,
                ..Default::default()
            }],
            ..Default::default()
        };
        tag_cache.add(&payload);
        metric_cache.add(&payload);
        (tag_cache, metric_cache)
    }

    #[test]
    fn report_classifies_sources_and_redundancy() {
        let (tag_cache, metric_cache) = seed();
        let report = audit_caches(&tag_cache, &metric_cache);

        assert_eq!(report.tag_cache.len(), 1);
        assert_eq!(report.tag_cache[0].source, "tag");
        assert!(report.tag_cache[0].possible_problem.is_empty());

        let env_row = report
            .metric_cache
            .iter()
            .find(|row| row.label_key == "env")
            .unwrap();
        assert_eq!(env_row.source, "tag");
        let route_row = report
            .metric_cache
            .iter()
            .find(|row| row.label_key == "route")
            .unwrap();
        assert_eq!(route_row.source, "meta");

        assert_eq!(report.redundant_keys, vec!["env"]);
        assert!(report.tag_cache_estimated_kb > 0.0);
        assert!(report.metric_cache_estimated_kb > report.tag_cache_estimated_kb);
    }

    #[test]
    fn examples_are_capped() {
        let tag_cache = TagCache::default();
        let metric_cache = MetricCache::default();
        for i in 0..10 {
            let mut meta = Meta::default();
            meta.tags.insert("host".into(), format!("node-{i:02}"));
            tag_cache.add(&MetricPayload {
                endpoint_id: format!("ep-{i}"),
                meta,
                ..Default::default()
            });
        }
        let report = audit_caches(&tag_cache, &metric_cache);
        assert_eq!(report.tag_cache[0].unique_values, 10);
        assert_eq!(report.tag_cache[0].example_values.len(), 5);
        assert_eq!(report.tag_cache[0].example_values[0], "node-00");
    }
}
