use crate::manager::AlertManager;
use gosight_model::{
    metric::canonical_metric_name, AlertInstance, AlertRule, CompareOp, Expression, LogPayload,
    MatchCriteria, Meta, MetricPayload, RuleKind,
};
use gosight_store::RuleStore;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Streaming rule evaluation over metric and log batches.
///
/// Holds the per-(rule, endpoint) firing bit and only signals the manager on
/// transitions; the manager layers cooldown on top. Rule fetch failures fail
/// open: the batch is skipped and the stream keeps flowing.
pub struct RuleEvaluator {
    rules: Arc<dyn RuleStore>,
    manager: Arc<AlertManager>,
    firing: Mutex<HashMap<String, bool>>,
    regex_cache: Mutex<HashMap<String, Option<Regex>>>,
}

impl RuleEvaluator {
    pub fn new(rules: Arc<dyn RuleStore>, manager: Arc<AlertManager>) -> Self {
        Self {
            rules,
            manager,
            firing: Mutex::new(HashMap::new()),
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every enabled metric rule against one payload.
    pub fn evaluate_metrics(&self, payload: &MetricPayload) {
        let rules = match self.rules.get_active_rules() {
            Ok(rules) => rules,
            Err(err) => {
                error!(error = %err, "rule fetch failed; skipping metric batch");
                return;
            }
        };
        let meta = &payload.meta;

        for rule in rules.iter().filter(|rule| rule.kind == RuleKind::Metric) {
            if !matches_meta(&rule.match_criteria, meta) {
                continue;
            }
            if rule.scope.metric.is_empty() {
                continue;
            }
            let target = canonical_metric_name(
                &rule.scope.namespace,
                &rule.scope.subnamespace,
                &rule.scope.metric,
            );
            let Some(metric) = payload
                .metrics
                .iter()
                .find(|metric| metric.fully_qualified().as_deref() == Some(target.as_str()))
            else {
                // The rule stays dormant for this endpoint until the metric
                // shows up.
                continue;
            };

            let value = metric.numeric_value();
            let triggered = self.evaluate_numeric(&rule.expression, value);
            self.apply_transition(rule, meta, value, triggered);
        }
    }

    /// Evaluate every enabled log rule against one payload. Log matches are
    /// fire-and-forget: there is no resolved edge.
    pub fn evaluate_logs(&self, payload: &LogPayload) {
        let rules = match self.rules.get_active_rules() {
            Ok(rules) => rules,
            Err(err) => {
                error!(error = %err, "rule fetch failed; skipping log batch");
                return;
            }
        };

        for entry in &payload.logs {
            let meta = entry.meta.as_ref().unwrap_or(&payload.meta);
            for rule in rules.iter().filter(|rule| rule.kind == RuleKind::Log) {
                if !matches_meta(&rule.match_criteria, meta) {
                    continue;
                }
                if !rule.match_criteria.category.is_empty()
                    && entry.category != rule.match_criteria.category
                {
                    continue;
                }
                if !rule.match_criteria.source.is_empty()
                    && entry.source != rule.match_criteria.source
                {
                    continue;
                }
                let field = entry.field(&rule.expression.datatype);
                if self.evaluate_text(&rule.expression, field) {
                    self.manager.handle_log_state(rule, meta, entry, true);
                }
            }
        }
    }

    /// Edge detection: signal the manager only when the firing bit flips.
    fn apply_transition(&self, rule: &AlertRule, meta: &Meta, value: f64, triggered: bool) {
        let key = AlertInstance::key(&rule.id, &meta.endpoint_id);
        let mut firing = self.firing.lock();
        let was_firing = firing.contains_key(&key);
        if triggered && !was_firing {
            firing.insert(key, true);
            self.manager.handle_state(rule, meta, value, true);
        } else if !triggered && was_firing {
            firing.remove(&key);
            self.manager.handle_state(rule, meta, value, false);
        }
    }

    fn evaluate_numeric(&self, expression: &Expression, left: f64) -> bool {
        match expression.operator {
            CompareOp::Contains | CompareOp::Regex => {
                self.evaluate_text(expression, &format_value(left))
            }
            op => match coerce_f64(&expression.value) {
                Some(right) => match op {
                    CompareOp::Gt => left > right,
                    CompareOp::Lt => left < right,
                    CompareOp::Ge => left >= right,
                    CompareOp::Le => left <= right,
                    CompareOp::Eq => left == right,
                    CompareOp::Neq => left != right,
                    CompareOp::Contains | CompareOp::Regex => unreachable!(),
                },
                None => false,
            },
        }
    }

    fn evaluate_text(&self, expression: &Expression, left: &str) -> bool {
        let right = value_as_string(&expression.value);
        match expression.operator {
            CompareOp::Eq => left == right,
            CompareOp::Neq => left != right,
            CompareOp::Contains => left.contains(right.as_str()),
            CompareOp::Regex => self.regex_matches(&right, left),
            // Numeric comparison over a text field: both sides must parse.
            op => match (left.trim().parse::<f64>().ok(), coerce_f64(&expression.value)) {
                (Some(lhs), Some(rhs)) => match op {
                    CompareOp::Gt => lhs > rhs,
                    CompareOp::Lt => lhs < rhs,
                    CompareOp::Ge => lhs >= rhs,
                    CompareOp::Le => lhs <= rhs,
                    _ => unreachable!(),
                },
                _ => false,
            },
        }
    }

    /// Compile-once regex lookup. A pattern that fails to compile is cached
    /// as a permanent non-match so the rule stays active without log spam.
    fn regex_matches(&self, pattern: &str, haystack: &str) -> bool {
        let mut cache = self.regex_cache.lock();
        let compiled = cache.entry(pattern.to_string()).or_insert_with(|| {
            match Regex::new(pattern) {
                Ok(regex) => Some(regex),
                Err(err) => {
                    warn!(pattern, error = %err, "invalid rule regex; treating as non-match");
                    None
                }
            }
        });
        compiled
            .as_ref()
            .map(|regex| regex.is_match(haystack))
            .unwrap_or(false)
    }
}

fn matches_meta(criteria: &MatchCriteria, meta: &Meta) -> bool {
    if !criteria.endpoint_ids.is_empty()
        && !criteria
            .endpoint_ids
            .iter()
            .any(|id| id == &meta.endpoint_id)
    {
        return false;
    }
    if !criteria.labels.is_empty() {
        let labels = meta.labels();
        for (key, value) in &criteria.labels {
            if labels.get(key) != Some(value) {
                return false;
            }
        }
    }
    for (key, value) in &criteria.tag_selectors {
        if meta.tags.get(key) != Some(value) {
            return false;
        }
    }
    true
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
