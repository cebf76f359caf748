use gosight_model::{LogEntry, LogPayload};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Default)]
struct LogCacheState {
    entries: HashMap<String, LogEntry>,
    order: VecDeque<String>,
}

/// Bounded map from log id to recent entry, evicted FIFO. Serves replay of
/// the recent stream without a round-trip to the log backend.
pub struct LogCache {
    state: Mutex<LogCacheState>,
    capacity: usize,
}

impl Default for LogCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl LogCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(LogCacheState::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn add(&self, payload: &LogPayload) {
        let mut state = self.state.lock();
        for entry in &payload.logs {
            if state.entries.insert(entry.id.clone(), entry.clone()).is_none() {
                state.order.push_back(entry.id.clone());
            }
            while state.order.len() > self.capacity {
                if let Some(evicted) = state.order.pop_front() {
                    state.entries.remove(&evicted);
                }
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<LogEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    /// Newest-first slice of the retained stream.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|id| state.entries.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(messages: &[&str]) -> LogPayload {
        LogPayload {
            endpoint_id: "ep-1".into(),
            logs: messages
                .iter()
                .map(|message| LogEntry {
                    message: (*message).into(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn eviction_is_fifo_past_capacity() {
        let cache = LogCache::new(2);
        cache.add(&payload(&["first", "second", "third"]));

        assert_eq!(cache.len(), 2);
        let recent = cache.recent(10);
        assert_eq!(recent[0].message, "third");
        assert_eq!(recent[1].message, "second");
    }

    #[test]
    fn entries_are_fetchable_by_id() {
        let cache = LogCache::default();
        let payload = payload(&["hello"]);
        cache.add(&payload);
        let id = &payload.logs[0].id;
        assert_eq!(cache.get(id).unwrap().message, "hello");
        assert!(cache.get("missing").is_none());
    }
}
