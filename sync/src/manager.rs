use crate::tracker::EndpointTracker;
use gosight_cache::TagCache;
use gosight_store::{ResourceStore, TagStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Cadence of the background loops.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Tag flush and endpoint sync interval.
    pub interval: Duration,
    /// Lifecycle sweep interval.
    pub lifecycle_interval: Duration,
    /// Deadline on each store flush.
    pub flush_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            lifecycle_interval: Duration::from_secs(30),
            flush_timeout: Duration::from_secs(30),
        }
    }
}

/// Coordinates the periodic cache-to-store flushes and the endpoint
/// lifecycle sweep on three long-lived tasks sharing one shutdown signal.
pub struct SyncManager {
    tag_cache: Arc<TagCache>,
    tag_store: Arc<dyn TagStore>,
    resource_store: Arc<dyn ResourceStore>,
    tracker: Arc<EndpointTracker>,
    config: SyncConfig,
}

impl SyncManager {
    pub fn new(
        tag_cache: Arc<TagCache>,
        tag_store: Arc<dyn TagStore>,
        resource_store: Arc<dyn ResourceStore>,
        tracker: Arc<EndpointTracker>,
        config: SyncConfig,
    ) -> Self {
        Self {
            tag_cache,
            tag_store,
            resource_store,
            tracker,
            config,
        }
    }

    /// Run until the shutdown signal flips, then perform one final sync so
    /// nothing dirty is stranded in memory.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let tag_task = {
            let manager = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(manager.config.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => manager.flush_tags().await,
                        _ = shutdown.changed() => {
                            debug!("tag sync loop stopping");
                            return;
                        }
                    }
                }
            })
        };

        let endpoint_task = {
            let manager = self.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(manager.config.interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            manager.tracker.sync_to_store(manager.resource_store.as_ref()).await;
                        }
                        _ = shutdown.changed() => {
                            debug!("endpoint sync loop stopping");
                            return;
                        }
                    }
                }
            })
        };

        let lifecycle_task = {
            let manager = self.clone();
            let mut shutdown = shutdown;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(manager.config.lifecycle_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            manager.tracker.check_agent_statuses_and_emit();
                            manager.tracker.check_container_statuses_and_emit();
                        }
                        _ = shutdown.changed() => {
                            debug!("lifecycle sweep stopping");
                            return;
                        }
                    }
                }
            })
        };

        let _ = tokio::join!(tag_task, endpoint_task, lifecycle_task);
        info!("sync manager draining");
        self.sync_once().await;
    }

    /// One full pass: tag flush plus endpoint sync.
    pub async fn sync_once(&self) {
        self.flush_tags().await;
        self.tracker.sync_to_store(self.resource_store.as_ref()).await;
    }

    async fn flush_tags(&self) {
        let flush = self.tag_cache.flush(self.tag_store.as_ref());
        match tokio::time::timeout(self.config.flush_timeout, flush).await {
            Ok(Ok(0)) => {}
            Ok(Ok(endpoints)) => debug!(endpoints, "tag cache flushed"),
            Ok(Err(err)) => warn!(error = %err, "tag flush failed; dirty set retained"),
            Err(_) => warn!("tag flush timed out; dirty set retained"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gosight_alerts::AlertEmitter;
    use gosight_model::{Meta, MetricPayload};
    use gosight_store::{MemoryResourceStore, MemoryTagStore};

    #[tokio::test]
    async fn run_drains_dirty_state_on_shutdown() {
        let tag_cache = Arc::new(TagCache::default());
        let tag_store = Arc::new(MemoryTagStore::new());
        let resource_store = Arc::new(MemoryResourceStore::new());
        let tracker = Arc::new(EndpointTracker::new(
            chrono::Duration::seconds(300),
            AlertEmitter::default(),
        ));

        let mut meta = Meta {
            endpoint_id: "ep-1".into(),
            ..Default::default()
        };
        meta.tags.insert("env".into(), "prod".into());
        tag_cache.add(&MetricPayload {
            endpoint_id: "ep-1".into(),
            meta,
            ..Default::default()
        });

        let manager = Arc::new(SyncManager::new(
            tag_cache.clone(),
            tag_store.clone(),
            resource_store,
            tracker,
            SyncConfig {
                interval: Duration::from_secs(3600),
                lifecycle_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = tokio::spawn(manager.run(shutdown_rx));

        shutdown_tx.send(true).unwrap();
        run.await.unwrap();

        assert_eq!(tag_cache.dirty_len(), 0);
        assert_eq!(tag_store.rows_for("ep-1").len(), 1);
    }
}
