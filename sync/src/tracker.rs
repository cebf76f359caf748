use chrono::{DateTime, Duration, Utc};
use gosight_alerts::AlertEmitter;
use gosight_model::{
    container_resource_id, host_resource_id, AlertEvent, AlertLevel, AlertState, Meta,
};
use gosight_store::ResourceStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    Agent,
    Container,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointStatus {
    Online,
    Offline,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Online => "online",
            EndpointStatus::Offline => "offline",
        }
    }
}

/// Liveness record for one emitter.
#[derive(Debug, Clone, Serialize)]
pub struct EndpointState {
    pub endpoint_id: String,
    pub resource_id: String,
    pub kind: EndpointKind,
    pub hostname: String,
    pub last_seen: DateTime<Utc>,
    pub status: EndpointStatus,
    dirty: bool,
}

/// Tracks per-endpoint liveness from the ingest stream, flips endpoints
/// offline past the threshold (emitting one down event per transition), and
/// syncs dirty rows through the resource store.
pub struct EndpointTracker {
    state: RwLock<HashMap<String, EndpointState>>,
    offline_after: Duration,
    emitter: AlertEmitter,
}

impl EndpointTracker {
    pub fn new(offline_after: Duration, emitter: AlertEmitter) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            offline_after,
            emitter,
        }
    }

    /// Record activity for the emitter behind `meta`. Called by ingest for
    /// every payload.
    pub fn observe(&self, meta: &Meta) {
        let endpoint_id = if meta.endpoint_id.is_empty() {
            return;
        } else {
            meta.endpoint_id.clone()
        };
        let (kind, resource_id) = if meta.is_container() {
            (EndpointKind::Container, container_resource_id(meta))
        } else {
            (EndpointKind::Agent, host_resource_id(meta))
        };

        let mut state = self.state.write();
        let entry = state
            .entry(endpoint_id.clone())
            .or_insert_with(|| EndpointState {
                endpoint_id,
                resource_id: resource_id.clone(),
                kind,
                hostname: meta.hostname.clone(),
                last_seen: Utc::now(),
                status: EndpointStatus::Online,
                dirty: true,
            });
        entry.last_seen = Utc::now();
        if entry.status != EndpointStatus::Online {
            info!(endpoint = %entry.endpoint_id, "endpoint back online");
            entry.status = EndpointStatus::Online;
        }
        entry.dirty = true;
    }

    /// Sweep agents past the offline threshold, emitting one `agent_down`
    /// event per transition.
    pub fn check_agent_statuses_and_emit(&self) {
        self.sweep(EndpointKind::Agent, "agent_down", Utc::now());
    }

    /// Container counterpart of the agent sweep.
    pub fn check_container_statuses_and_emit(&self) {
        self.sweep(EndpointKind::Container, "container_down", Utc::now());
    }

    fn sweep(&self, kind: EndpointKind, source: &str, now: DateTime<Utc>) {
        let cutoff = now - self.offline_after;
        let mut state = self.state.write();
        for entry in state.values_mut() {
            if entry.kind != kind
                || entry.status != EndpointStatus::Online
                || entry.last_seen >= cutoff
            {
                continue;
            }
            entry.status = EndpointStatus::Offline;
            entry.dirty = true;
            warn!(endpoint = %entry.endpoint_id, hostname = %entry.hostname, source, "endpoint went dark");
            self.emitter.emit(down_event(entry, source, now));
        }
    }

    /// Persist dirty endpoint rows through the resource store. Rows whose
    /// resource has not been flushed yet stay dirty and retry next interval.
    pub async fn sync_to_store(&self, store: &dyn ResourceStore) {
        let snapshot: Vec<EndpointState> = {
            let state = self.state.read();
            state.values().filter(|entry| entry.dirty).cloned().collect()
        };
        if snapshot.is_empty() {
            return;
        }

        let mut synced = Vec::with_capacity(snapshot.len());
        for entry in &snapshot {
            let last_seen = store.update_last_seen(&entry.resource_id, entry.last_seen).await;
            let status = store
                .update_status(&entry.resource_id, entry.status.as_str())
                .await;
            match last_seen.and(status) {
                Ok(()) => synced.push(entry.endpoint_id.clone()),
                Err(err) => {
                    debug!(endpoint = %entry.endpoint_id, error = %err, "endpoint sync deferred")
                }
            }
        }

        let mut state = self.state.write();
        for endpoint_id in synced {
            if let Some(entry) = state.get_mut(&endpoint_id) {
                entry.dirty = false;
            }
        }
    }

    pub fn get(&self, endpoint_id: &str) -> Option<EndpointState> {
        self.state.read().get(endpoint_id).cloned()
    }

    pub fn list(&self) -> Vec<EndpointState> {
        self.state.read().values().cloned().collect()
    }

    pub fn dirty_len(&self) -> usize {
        self.state.read().values().filter(|entry| entry.dirty).count()
    }

    #[cfg(test)]
    fn backdate(&self, endpoint_id: &str, seen: DateTime<Utc>) {
        if let Some(entry) = self.state.write().get_mut(endpoint_id) {
            entry.last_seen = seen;
        }
    }
}

fn down_event(entry: &EndpointState, source: &str, now: DateTime<Utc>) -> AlertEvent {
    let mut labels = HashMap::new();
    labels.insert("endpoint_id".to_string(), entry.endpoint_id.clone());
    if !entry.hostname.is_empty() {
        labels.insert("hostname".to_string(), entry.hostname.clone());
    }
    AlertEvent {
        id: Uuid::new_v4().to_string(),
        rule_id: String::new(),
        endpoint_id: entry.endpoint_id.clone(),
        state: AlertState::Firing,
        level: AlertLevel::Warning,
        category: "lifecycle".to_string(),
        source: source.to_string(),
        message: format!("{} has stopped reporting", entry.endpoint_id),
        value: 0.0,
        labels,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_model::Resource;
    use gosight_store::MemoryResourceStore;
    use tokio::sync::broadcast::error::TryRecvError;

    fn agent_meta(endpoint: &str) -> Meta {
        Meta {
            endpoint_id: endpoint.into(),
            host_id: format!("{endpoint}-host"),
            hostname: format!("{endpoint}.example"),
            ..Default::default()
        }
    }

    fn container_meta(endpoint: &str) -> Meta {
        Meta {
            endpoint_id: endpoint.into(),
            container_id: format!("{endpoint}-ctr"),
            ..Default::default()
        }
    }

    fn drain(rx: &mut tokio::sync::broadcast::Receiver<AlertEvent>) -> Vec<AlertEvent> {
        let mut out = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => out.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                Err(TryRecvError::Lagged(_)) => continue,
            }
        }
        out
    }

    #[tokio::test]
    async fn down_events_fire_once_per_transition() {
        let emitter = AlertEmitter::default();
        let mut events = emitter.subscribe();
        let tracker = EndpointTracker::new(Duration::seconds(60), emitter);

        tracker.observe(&agent_meta("ep-1"));
        tracker.observe(&container_meta("ep-2"));
        tracker.backdate("ep-1", Utc::now() - Duration::seconds(120));
        tracker.backdate("ep-2", Utc::now() - Duration::seconds(120));

        tracker.check_agent_statuses_and_emit();
        tracker.check_container_statuses_and_emit();
        let first = drain(&mut events);
        assert_eq!(first.len(), 2);
        assert!(first.iter().any(|event| event.source == "agent_down"));
        assert!(first.iter().any(|event| event.source == "container_down"));

        // Already offline: the next sweep stays silent.
        tracker.check_agent_statuses_and_emit();
        tracker.check_container_statuses_and_emit();
        assert!(drain(&mut events).is_empty());

        // Fresh traffic flips it back online.
        tracker.observe(&agent_meta("ep-1"));
        assert_eq!(
            tracker.get("ep-1").unwrap().status,
            EndpointStatus::Online
        );
    }

    #[tokio::test]
    async fn store_sync_clears_dirt_only_on_success() {
        let emitter = AlertEmitter::default();
        let tracker = EndpointTracker::new(Duration::seconds(60), emitter);
        let store = MemoryResourceStore::new();

        tracker.observe(&agent_meta("ep-1"));
        assert_eq!(tracker.dirty_len(), 1);

        // The backing resource row does not exist yet: stays dirty.
        tracker.sync_to_store(&store).await;
        assert_eq!(tracker.dirty_len(), 1);

        let resource_id = tracker.get("ep-1").unwrap().resource_id.clone();
        store
            .create(&Resource::new(resource_id.clone(), "host"))
            .await
            .unwrap();
        tracker.sync_to_store(&store).await;
        assert_eq!(tracker.dirty_len(), 0);
        let row = store.get(&resource_id).await.unwrap().unwrap();
        assert_eq!(row.status, "online");
    }
}
