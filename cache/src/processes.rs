use chrono::{DateTime, Duration, Utc};
use gosight_model::ProcessSnapshot;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Per-endpoint ring of timestamped process snapshots with time-based
/// eviction (default window: 30 minutes).
pub struct ProcessCache {
    state: RwLock<HashMap<String, Vec<ProcessSnapshot>>>,
    window: Duration,
}

impl Default for ProcessCache {
    fn default() -> Self {
        Self::new(Duration::minutes(30))
    }
}

impl ProcessCache {
    pub fn new(window: Duration) -> Self {
        Self {
            state: RwLock::new(HashMap::new()),
            window,
        }
    }

    pub fn add(&self, snapshot: ProcessSnapshot) {
        self.add_at(snapshot, Utc::now());
    }

    fn add_at(&self, snapshot: ProcessSnapshot, now: DateTime<Utc>) {
        if snapshot.endpoint_id.is_empty() {
            return;
        }
        let cutoff = now - self.window;
        let mut state = self.state.write();
        let ring = state.entry(snapshot.endpoint_id.clone()).or_default();
        ring.push(snapshot);
        evict_prefix(ring, cutoff);
    }

    pub fn get(&self, endpoint_id: &str) -> Vec<ProcessSnapshot> {
        self.state
            .read()
            .get(endpoint_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn endpoint_count(&self) -> usize {
        self.state.read().len()
    }

    /// Apply the eviction scan to every endpoint and drop empty rings.
    pub fn prune(&self) {
        self.prune_at(Utc::now());
    }

    fn prune_at(&self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        let mut state = self.state.write();
        for ring in state.values_mut() {
            evict_prefix(ring, cutoff);
        }
        state.retain(|_, ring| !ring.is_empty());
    }
}

/// Drop the leading snapshots at or before `cutoff`, keeping the suffix.
fn evict_prefix(ring: &mut Vec<ProcessSnapshot>, cutoff: DateTime<Utc>) {
    let keep_from = ring
        .iter()
        .position(|snapshot| snapshot.timestamp > cutoff)
        .unwrap_or(ring.len());
    if keep_from > 0 {
        ring.drain(..keep_from);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(endpoint: &str, age_minutes: i64) -> ProcessSnapshot {
        ProcessSnapshot {
            endpoint_id: endpoint.into(),
            timestamp: Utc::now() - Duration::minutes(age_minutes),
            ..Default::default()
        }
    }

    #[test]
    fn add_evicts_expired_prefix() {
        let cache = ProcessCache::default();
        cache.add(snapshot("ep-1", 45));
        cache.add(snapshot("ep-1", 31));
        cache.add(snapshot("ep-1", 5));
        cache.add(snapshot("ep-1", 0));

        let ring = cache.get("ep-1");
        assert_eq!(ring.len(), 2);
        assert!(ring.iter().all(|s| s.timestamp > Utc::now() - Duration::minutes(30)));
    }

    #[test]
    fn prune_drops_empty_endpoints() {
        let cache = ProcessCache::default();
        cache.add(snapshot("ep-gone", 40));
        cache.add(snapshot("ep-live", 1));

        // The emptied ring keeps its endpoint slot until the global scan.
        assert_eq!(cache.endpoint_count(), 2);
        cache.prune();
        assert_eq!(cache.endpoint_count(), 1);
        assert!(cache.get("ep-gone").is_empty());
        assert_eq!(cache.get("ep-live").len(), 1);
    }
}
