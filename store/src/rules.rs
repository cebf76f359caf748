use crate::error::{Result, StoreError};
use crate::RuleStore;
use gosight_model::AlertRule;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(DocumentFormat::Json),
            Some("yaml") | Some("yml") => Ok(DocumentFormat::Yaml),
            other => Err(StoreError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Rule store backed by a single flat document (JSON or YAML array of rules).
/// Writes are full-file replacements performed under the store's write lock.
pub struct FileRuleStore {
    path: PathBuf,
    format: DocumentFormat,
    rules: RwLock<Vec<AlertRule>>,
}

impl FileRuleStore {
    /// Open (or create on first write) the rule document at `path`. The
    /// format is chosen by the file extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = DocumentFormat::from_path(&path)?;
        let rules = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let rules: Vec<AlertRule> = match format {
                DocumentFormat::Json => serde_json::from_str(&raw)?,
                DocumentFormat::Yaml => serde_yaml::from_str(&raw)?,
            };
            info!(count = rules.len(), path = %path.display(), "loaded alert rules");
            rules
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            format,
            rules: RwLock::new(rules),
        })
    }

    fn persist(&self, rules: &[AlertRule]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw = match self.format {
            DocumentFormat::Json => serde_json::to_string_pretty(rules)?,
            DocumentFormat::Yaml => serde_yaml::to_string(rules)?,
        };
        fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl RuleStore for FileRuleStore {
    fn add_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        let mut rules = self.rules.write();
        if rule.id.is_empty() {
            rule.id = Uuid::new_v4().to_string();
        } else if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(StoreError::DuplicateRule(rule.id));
        }
        rules.push(rule.clone());
        self.persist(&rules)?;
        Ok(rule)
    }

    fn update_rule(&self, rule: AlertRule) -> Result<()> {
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or_else(|| StoreError::RuleNotFound(rule.id.clone()))?;
        *slot = rule;
        self.persist(&rules)
    }

    fn delete_rule(&self, id: &str) -> Result<()> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        if rules.len() == before {
            return Err(StoreError::RuleNotFound(id.to_string()));
        }
        self.persist(&rules)
    }

    fn list_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.rules.read().clone())
    }

    fn get_active_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect())
    }

    fn get_rule_by_id(&self, id: &str) -> Result<Option<AlertRule>> {
        Ok(self.rules.read().iter().find(|rule| rule.id == id).cloned())
    }

    fn get_rule_by_name(&self, name: &str) -> Result<Option<AlertRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .find(|rule| rule.name == name)
            .cloned())
    }
}

/// Volatile rule store for tests and embedded setups.
#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<AlertRule>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<AlertRule>) -> Self {
        Self {
            rules: RwLock::new(rules),
        }
    }
}

impl RuleStore for MemoryRuleStore {
    fn add_rule(&self, mut rule: AlertRule) -> Result<AlertRule> {
        let mut rules = self.rules.write();
        if rule.id.is_empty() {
            rule.id = Uuid::new_v4().to_string();
        } else if rules.iter().any(|existing| existing.id == rule.id) {
            return Err(StoreError::DuplicateRule(rule.id));
        }
        rules.push(rule.clone());
        Ok(rule)
    }

    fn update_rule(&self, rule: AlertRule) -> Result<()> {
        let mut rules = self.rules.write();
        let slot = rules
            .iter_mut()
            .find(|existing| existing.id == rule.id)
            .ok_or_else(|| StoreError::RuleNotFound(rule.id.clone()))?;
        *slot = rule;
        Ok(())
    }

    fn delete_rule(&self, id: &str) -> Result<()> {
        let mut rules = self.rules.write();
        let before = rules.len();
        rules.retain(|rule| rule.id != id);
        if rules.len() == before {
            return Err(StoreError::RuleNotFound(id.to_string()));
        }
        Ok(())
    }

    fn list_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self.rules.read().clone())
    }

    fn get_active_rules(&self) -> Result<Vec<AlertRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .filter(|rule| rule.enabled)
            .cloned()
            .collect())
    }

    fn get_rule_by_id(&self, id: &str) -> Result<Option<AlertRule>> {
        Ok(self.rules.read().iter().find(|rule| rule.id == id).cloned())
    }

    fn get_rule_by_name(&self, name: &str) -> Result<Option<AlertRule>> {
        Ok(self
            .rules
            .read()
            .iter()
            .find(|rule| rule.name == name)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_model::{CompareOp, Expression};
    use tempfile::tempdir;

    fn rule(name: &str) -> AlertRule {
        AlertRule {
            name: name.into(),
            expression: Expression {
                operator: CompareOp::Gt,
                value: serde_json::json!(80),
                datatype: String::new(),
            },
            ..Default::default()
        }
    }

    #[test]
    fn json_document_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.json");

        let store = FileRuleStore::open(&path).unwrap();
        let stored = store.add_rule(rule("cpu high")).unwrap();
        assert!(!stored.id.is_empty());

        let reopened = FileRuleStore::open(&path).unwrap();
        let rules = reopened.list_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "cpu high");
    }

    #[test]
    fn yaml_document_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rules.yaml");

        let store = FileRuleStore::open(&path).unwrap();
        store.add_rule(rule("disk full")).unwrap();

        let reopened = FileRuleStore::open(&path).unwrap();
        assert_eq!(reopened.list_rules().unwrap().len(), 1);
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        assert!(matches!(
            FileRuleStore::open("rules.toml"),
            Err(StoreError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn active_rules_exclude_disabled() {
        let store = MemoryRuleStore::new();
        store.add_rule(rule("a")).unwrap();
        let mut disabled = rule("b");
        disabled.enabled = false;
        store.add_rule(disabled).unwrap();

        assert_eq!(store.list_rules().unwrap().len(), 2);
        let active = store.get_active_rules().unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "a");
    }

    #[test]
    fn duplicate_ids_and_missing_updates_error() {
        let store = MemoryRuleStore::new();
        let stored = store.add_rule(rule("a")).unwrap();

        let mut copy = rule("copy");
        copy.id = stored.id.clone();
        assert!(matches!(
            store.add_rule(copy),
            Err(StoreError::DuplicateRule(_))
        ));

        let mut ghost = rule("ghost");
        ghost.id = "missing".into();
        assert!(matches!(
            store.update_rule(ghost),
            Err(StoreError::RuleNotFound(_))
        ));
        assert!(matches!(
            store.delete_rule("missing"),
            Err(StoreError::RuleNotFound(_))
        ));
    }
}
