use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Whether a rule evaluates metric samples or log records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    #[default]
    Metric,
    Log,
}

/// Severity attached to events raised by a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    #[default]
    Warning,
    Critical,
}

/// An alert rule as persisted in the rule document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: RuleKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub level: AlertLevel,
    #[serde(default)]
    pub message: String,
    /// Minimum interval in seconds between successive firing emissions for a
    /// single rule+endpoint. Zero disables suppression.
    #[serde(default)]
    pub cooldown: u64,
    #[serde(rename = "match", default)]
    pub match_criteria: MatchCriteria,
    #[serde(default)]
    pub expression: Expression,
    #[serde(default)]
    pub scope: MetricScope,
}

fn default_enabled() -> bool {
    true
}

impl Default for AlertRule {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            description: String::new(),
            kind: RuleKind::default(),
            enabled: true,
            level: AlertLevel::default(),
            message: String::new(),
            cooldown: 0,
            match_criteria: MatchCriteria::default(),
            expression: Expression::default(),
            scope: MetricScope::default(),
        }
    }
}

/// Emitter selection: all present criteria must hold.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchCriteria {
    pub endpoint_ids: Vec<String>,
    pub labels: HashMap<String, String>,
    pub tag_selectors: HashMap<String, String>,
    pub category: String,
    pub source: String,
}

impl MatchCriteria {
    pub fn is_empty(&self) -> bool {
        self.endpoint_ids.is_empty()
            && self.labels.is_empty()
            && self.tag_selectors.is_empty()
            && self.category.is_empty()
            && self.source.is_empty()
    }
}

/// Metric addressed by a metric rule, joined as `ns.sub.metric` (lowercased)
/// when resolving samples in a payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricScope {
    pub namespace: String,
    pub subnamespace: String,
    pub metric: String,
}

/// Comparison applied by a rule. The left operand is implicit (the extracted
/// metric value, or the log field named by `datatype`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = ">")]
    #[default]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "regex")]
    Regex,
}

/// Flat comparison expression; not a parsed language.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Expression {
    #[serde(default)]
    pub operator: CompareOp,
    #[serde(default)]
    pub value: serde_json::Value,
    /// Log field the comparison reads: `level`, `message`, or `source`.
    /// Ignored for metric rules.
    #[serde(default)]
    pub datatype: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rules_default_to_enabled() {
        let rule: AlertRule = serde_json::from_str(
            r#"{"name":"cpu high","expression":{"operator":">","value":80}}"#,
        )
        .unwrap();
        assert!(rule.enabled);
        assert_eq!(rule.kind, RuleKind::Metric);
        assert_eq!(rule.expression.operator, CompareOp::Gt);
    }

    #[test]
    fn operator_aliases_parse() {
        let expr: Expression =
            serde_json::from_str(r#"{"operator":"==","value":"ok"}"#).unwrap();
        assert_eq!(expr.operator, CompareOp::Eq);
        let expr: Expression =
            serde_json::from_str(r#"{"operator":"contains","value":"fail"}"#).unwrap();
        assert_eq!(expr.operator, CompareOp::Contains);
    }
}
