use crate::emit::{AlertDispatcher, AlertEmitter};
use chrono::{DateTime, Duration, Utc};
use gosight_model::{
    metric::canonical_metric_name, AlertEvent, AlertInstance, AlertRule, AlertState, LogEntry, Meta,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

/// Per-(rule, endpoint) alert state machine.
///
/// All transitions pass through one write lock, so a firing event always
/// precedes the matching resolved event for a given key. Emission happens
/// under the lock; the emitter and dispatcher are channel handles that never
/// block.
pub struct AlertManager {
    active: RwLock<HashMap<String, AlertInstance>>,
    emitter: AlertEmitter,
    dispatcher: AlertDispatcher,
}

impl AlertManager {
    pub fn new(emitter: AlertEmitter, dispatcher: AlertDispatcher) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            emitter,
            dispatcher,
        }
    }

    /// Apply an edge-triggered signal from the metric evaluator.
    pub fn handle_state(&self, rule: &AlertRule, meta: &Meta, value: f64, triggered: bool) {
        self.handle_state_at(rule, meta, value, triggered, Utc::now());
    }

    fn handle_state_at(
        &self,
        rule: &AlertRule,
        meta: &Meta,
        value: f64,
        triggered: bool,
        now: DateTime<Utc>,
    ) {
        let source = canonical_metric_name(
            &rule.scope.namespace,
            &rule.scope.subnamespace,
            &rule.scope.metric,
        );
        let key = AlertInstance::key(&rule.id, &meta.endpoint_id);
        let mut active = self.active.write();

        if triggered {
            if let Some(instance) = active.get_mut(&key) {
                if in_cooldown(rule, instance, now) {
                    return;
                }
                // Still firing: refresh, no second emission this interval.
                instance.last_fired = now;
                instance.last_value = value;
                return;
            }
            let instance = new_instance(rule, meta, value, now);
            let event = build_event(rule, meta, &instance, AlertState::Firing, &source, now);
            active.insert(key, instance);
            info!(rule = %rule.id, endpoint = %meta.endpoint_id, "alert firing");
            self.emitter.emit(event.clone());
            self.dispatcher.dispatch(event);
        } else if let Some(instance) = active.remove(&key) {
            let mut event = build_event(rule, meta, &instance, AlertState::Ok, &source, now);
            event.message = format!("Resolved: {}", rule.message);
            info!(rule = %rule.id, endpoint = %meta.endpoint_id, "alert resolved");
            // Resolution is informational: it reaches stream subscribers but
            // not the notification pipeline.
            self.emitter.emit(event);
        }
    }

    /// Apply a matching log record. Logs are point-in-time: cooldown applies,
    /// resolution never does.
    pub fn handle_log_state(&self, rule: &AlertRule, meta: &Meta, log: &LogEntry, triggered: bool) {
        self.handle_log_state_at(rule, meta, log, triggered, Utc::now());
    }

    fn handle_log_state_at(
        &self,
        rule: &AlertRule,
        meta: &Meta,
        log: &LogEntry,
        triggered: bool,
        now: DateTime<Utc>,
    ) {
        if !triggered {
            return;
        }
        let source = if log.source.is_empty() {
            "log".to_string()
        } else {
            log.source.clone()
        };
        let key = AlertInstance::key(&rule.id, &meta.endpoint_id);
        let mut active = self.active.write();

        if let Some(instance) = active.get_mut(&key) {
            if in_cooldown(rule, instance, now) {
                return;
            }
            instance.last_fired = now;
        } else {
            active.insert(key.clone(), new_instance(rule, meta, 0.0, now));
        }
        let instance = &active[&key];
        let mut event = build_event(rule, meta, instance, AlertState::Firing, &source, now);
        if event.message.is_empty() {
            event.message = log.message.clone();
        }
        info!(rule = %rule.id, endpoint = %meta.endpoint_id, "log alert firing");
        self.emitter.emit(event.clone());
        self.dispatcher.dispatch(event);
    }

    /// Snapshot of the live instances.
    pub fn list_active(&self) -> Vec<AlertInstance> {
        self.active.read().values().cloned().collect()
    }
}

fn in_cooldown(rule: &AlertRule, instance: &AlertInstance, now: DateTime<Utc>) -> bool {
    rule.cooldown > 0 && now - instance.last_fired < Duration::seconds(rule.cooldown as i64)
}

fn new_instance(rule: &AlertRule, meta: &Meta, value: f64, now: DateTime<Utc>) -> AlertInstance {
    AlertInstance {
        rule_id: rule.id.clone(),
        endpoint_id: meta.endpoint_id.clone(),
        state: AlertState::Firing,
        previous: AlertState::Ok,
        first_fired: now,
        last_fired: now,
        last_value: value,
        labels: meta.tags.clone(),
        message: rule.message.clone(),
        level: rule.level,
    }
}

fn build_event(
    rule: &AlertRule,
    meta: &Meta,
    instance: &AlertInstance,
    state: AlertState,
    source: &str,
    now: DateTime<Utc>,
) -> AlertEvent {
    let mut labels = meta.tags.clone();
    labels.insert("rule_id".to_string(), rule.id.clone());
    AlertEvent {
        id: Uuid::new_v4().to_string(),
        rule_id: rule.id.clone(),
        endpoint_id: meta.endpoint_id.clone(),
        state,
        level: rule.level,
        category: "alert".to_string(),
        source: source.to_string(),
        message: if rule.message.is_empty() {
            rule.name.clone()
        } else {
            rule.message.clone()
        },
        value: instance.last_value,
        labels,
        timestamp: now,
    }
}
