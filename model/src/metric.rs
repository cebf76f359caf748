use crate::meta::Meta;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ingest unit streamed by an agent: one emitter, one timestamp, a batch of
/// samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricPayload {
    pub endpoint_id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl Default for MetricPayload {
    fn default() -> Self {
        Self {
            endpoint_id: String::new(),
            timestamp: Utc::now(),
            meta: Meta::default(),
            metrics: Vec::new(),
        }
    }
}

/// Metric sample kind, mirroring the OTLP-style families agents report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    #[default]
    Gauge,
    Sum,
    Histogram,
    Summary,
    #[serde(other)]
    Unknown,
}

/// A single sample within a payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub subnamespace: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(rename = "type", default)]
    pub kind: MetricKind,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub dimensions: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_points: Option<Vec<DataPoint>>,
}

/// Aggregated point carried by histogram/summary samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub sum: f64,
    #[serde(default)]
    pub count: u64,
}

impl Metric {
    /// Fully-qualified `ns.sub.name` key, lowercased. Empty path components
    /// are dropped so `("", "", "uptime")` keys as `uptime`. Returns `None`
    /// for samples without a name; those are dropped at ingest.
    pub fn fully_qualified(&self) -> Option<String> {
        if self.name.is_empty() {
            return None;
        }
        Some(canonical_metric_name(
            &self.namespace,
            &self.subnamespace,
            &self.name,
        ))
    }

    /// Numeric value used for rule evaluation. Gauges and sums prefer the
    /// first data point; histograms report the mean (`sum/count`, or `sum`
    /// when empty); summaries report `sum`.
    pub fn numeric_value(&self) -> f64 {
        let first = self.data_points.as_ref().and_then(|points| points.first());
        match self.kind {
            MetricKind::Gauge | MetricKind::Sum => first.map(|p| p.value).unwrap_or(self.value),
            MetricKind::Histogram => match first {
                Some(p) if p.count > 0 => p.sum / p.count as f64,
                Some(p) => p.sum,
                None => self.value,
            },
            MetricKind::Summary => first.map(|p| p.sum).unwrap_or(self.value),
            MetricKind::Unknown => first.map(|p| p.value).unwrap_or(self.value),
        }
    }
}

/// Lowercased dotted metric path with empty components removed.
pub fn canonical_metric_name(namespace: &str, subnamespace: &str, name: &str) -> String {
    let mut parts = Vec::with_capacity(3);
    for part in [namespace, subnamespace, name] {
        if !part.is_empty() {
            parts.push(part.to_lowercase());
        }
    }
    parts.join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fully_qualified_lowercases_and_drops_empties() {
        let metric = Metric {
            namespace: "System".into(),
            subnamespace: "CPU".into(),
            name: "Usage".into(),
            ..Default::default()
        };
        assert_eq!(metric.fully_qualified().as_deref(), Some("system.cpu.usage"));

        let bare = Metric {
            name: "uptime".into(),
            ..Default::default()
        };
        assert_eq!(bare.fully_qualified().as_deref(), Some("uptime"));

        assert!(Metric::default().fully_qualified().is_none());
    }

    #[test]
    fn numeric_value_per_kind() {
        let gauge = Metric {
            name: "g".into(),
            kind: MetricKind::Gauge,
            value: 4.0,
            data_points: Some(vec![DataPoint {
                value: 9.0,
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert_eq!(gauge.numeric_value(), 9.0);

        let histogram = Metric {
            name: "h".into(),
            kind: MetricKind::Histogram,
            data_points: Some(vec![DataPoint {
                sum: 30.0,
                count: 3,
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert_eq!(histogram.numeric_value(), 10.0);

        let empty_histogram = Metric {
            name: "h".into(),
            kind: MetricKind::Histogram,
            data_points: Some(vec![DataPoint {
                sum: 30.0,
                count: 0,
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert_eq!(empty_histogram.numeric_value(), 30.0);

        let summary = Metric {
            name: "s".into(),
            kind: MetricKind::Summary,
            data_points: Some(vec![DataPoint {
                sum: 12.5,
                count: 5,
                ..Default::default()
            }]),
            ..Default::default()
        };
        assert_eq!(summary.numeric_value(), 12.5);
    }

    #[test]
    fn unknown_kind_round_trips_from_wire() {
        let metric: Metric =
            serde_json::from_str(r#"{"name":"x","type":"exponential_histogram"}"#).unwrap();
        assert_eq!(metric.kind, MetricKind::Unknown);
    }
}
