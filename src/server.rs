use anyhow::{Context, Result};
use chrono::Duration;
use gosight_alerts::{AlertDispatcher, AlertEmitter, AlertManager, RuleEvaluator};
use gosight_cache::{
    audit_caches, CacheAuditReport, LogCache, MetricCache, ProcessCache, ResourceCache,
    ResourceCacheConfig, TagCache,
};
use gosight_ingest::{IngestPipeline, IngestServer};
use gosight_model::AlertEvent;
use gosight_server_core::ServerConfig;
use gosight_store::{
    FileRuleStore, MemoryLogStore, MemoryMetricStore, MemoryResourceStore, MemoryTagStore,
    TagStore,
};
use gosight_sync::{EndpointTracker, SyncConfig, SyncManager};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// How often the in-memory caches shed state past their retention windows.
const CACHE_PRUNE_INTERVAL: StdDuration = StdDuration::from_secs(3600);

/// Fully wired but not yet started server.
pub struct Server {
    config: ServerConfig,
    metric_cache: Arc<MetricCache>,
    tag_cache: Arc<TagCache>,
    resource_cache: ResourceCache,
    process_cache: Arc<ProcessCache>,
    emitter: AlertEmitter,
    alert_manager: Arc<AlertManager>,
    tag_store: Arc<MemoryTagStore>,
    pipeline: Arc<IngestPipeline>,
    sync_manager: Arc<SyncManager>,
    notifications: mpsc::Receiver<AlertEvent>,
}

impl Server {
    /// Wire every component from configuration. The long-term metric, log,
    /// resource, and tag backends default to the in-memory reference stores;
    /// the rule document lives at `config.rules.path`.
    pub fn build(config: ServerConfig) -> Result<Self> {
        let metric_store = Arc::new(MemoryMetricStore::new());
        let log_store = Arc::new(MemoryLogStore::new());
        let resource_store = Arc::new(MemoryResourceStore::new());
        let tag_store = Arc::new(MemoryTagStore::new());
        let rule_store = Arc::new(
            FileRuleStore::open(&config.rules.path).context("failed to open rule document")?,
        );

        let metric_cache = Arc::new(MetricCache::new(Duration::hours(
            config.cache.metric_retention_hours,
        )));
        let tag_cache = Arc::new(TagCache::new(Duration::hours(
            config.cache.tag_retention_hours,
        )));
        let resource_cache = ResourceCache::new(
            resource_store.clone(),
            ResourceCacheConfig {
                flush_interval: StdDuration::from_secs(config.sync.resource_flush_interval_secs),
                flush_timeout: StdDuration::from_secs(config.sync.flush_timeout_secs),
            },
        );
        let process_cache = Arc::new(ProcessCache::new(Duration::minutes(
            config.cache.process_window_minutes,
        )));
        let log_cache = Arc::new(LogCache::new(config.cache.log_capacity));

        let emitter = AlertEmitter::default();
        let (dispatcher, notifications) = AlertDispatcher::new(256);
        let manager = Arc::new(AlertManager::new(emitter.clone(), dispatcher));
        let evaluator = Arc::new(RuleEvaluator::new(rule_store, manager.clone()));
        let tracker = Arc::new(EndpointTracker::new(
            Duration::seconds(config.sync.endpoint_offline_after_secs),
            emitter.clone(),
        ));

        let pipeline = Arc::new(IngestPipeline::new(
            metric_cache.clone(),
            tag_cache.clone(),
            resource_cache.clone(),
            process_cache.clone(),
            log_cache,
            metric_store,
            log_store,
            evaluator,
            tracker.clone(),
        ));

        let sync_manager = Arc::new(SyncManager::new(
            tag_cache.clone(),
            tag_store.clone(),
            resource_store,
            tracker,
            SyncConfig {
                interval: StdDuration::from_secs(config.sync.interval_secs),
                lifecycle_interval: StdDuration::from_secs(config.sync.lifecycle_interval_secs),
                flush_timeout: StdDuration::from_secs(config.sync.flush_timeout_secs),
            },
        ));

        Ok(Self {
            config,
            metric_cache,
            tag_cache,
            resource_cache,
            process_cache,
            emitter,
            alert_manager: manager,
            tag_store,
            pipeline,
            sync_manager,
            notifications,
        })
    }

    /// Bind the ingest listener and spawn the background tasks.
    pub async fn start(self) -> Result<ServerHandle> {
        // Seed the tag cache before any flush can run.
        match self.tag_store.load_all().await {
            Ok(records) => self.tag_cache.load_from_store(&records),
            Err(err) => warn!(error = %err, "tag seed failed; starting cold"),
        }

        let bind = self
            .config
            .ingest
            .bind_address()
            .context("invalid ingest bind address")?;
        let listener = TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind ingest listener on {bind}"))?;
        let ingest_addr = listener.local_addr()?;

        let (shutdown, shutdown_rx) = watch::channel(false);
        self.resource_cache.start();

        let sync_task = tokio::spawn(self.sync_manager.clone().run(shutdown_rx.clone()));
        let ingest_task = {
            let server = IngestServer::new(self.pipeline.clone());
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(async move {
                if let Err(err) = server.serve(listener, shutdown_rx).await {
                    warn!(error = %err, "ingest listener failed");
                }
            })
        };
        let notification_task =
            tokio::spawn(drain_notifications(self.notifications, shutdown_rx.clone()));
        let prune_task = {
            let metric_cache = self.metric_cache.clone();
            let tag_cache = self.tag_cache.clone();
            let process_cache = self.process_cache.clone();
            let mut shutdown_rx = shutdown_rx;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(CACHE_PRUNE_INTERVAL);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            metric_cache.prune();
                            tag_cache.prune();
                            process_cache.prune();
                        }
                        _ = shutdown_rx.changed() => return,
                    }
                }
            })
        };

        info!(addr = %ingest_addr, "pipeline started");
        Ok(ServerHandle {
            ingest_addr,
            metric_cache: self.metric_cache,
            tag_cache: self.tag_cache,
            resource_cache: self.resource_cache,
            alert_manager: self.alert_manager,
            emitter: self.emitter,
            shutdown,
            sync_task,
            ingest_task,
            notification_task,
            prune_task,
        })
    }
}

/// Running server: shared query surfaces plus lifecycle control.
pub struct ServerHandle {
    pub ingest_addr: SocketAddr,
    pub metric_cache: Arc<MetricCache>,
    pub tag_cache: Arc<TagCache>,
    pub resource_cache: ResourceCache,
    alert_manager: Arc<AlertManager>,
    emitter: AlertEmitter,
    shutdown: watch::Sender<bool>,
    sync_task: JoinHandle<()>,
    ingest_task: JoinHandle<()>,
    notification_task: JoinHandle<()>,
    prune_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Subscribe to the live alert/lifecycle event stream.
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<AlertEvent> {
        self.emitter.subscribe()
    }

    /// Snapshot of the currently firing alert instances.
    pub fn active_alerts(&self) -> Vec<gosight_model::AlertInstance> {
        self.alert_manager.list_active()
    }

    /// Cardinality and memory report over the label indices.
    pub fn audit(&self) -> CacheAuditReport {
        audit_caches(&self.tag_cache, &self.metric_cache)
    }

    /// Stop every task, drain the sync loops, and perform the final resource
    /// flush. Tasks exit within one tick of their interval.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        let _ = self.sync_task.await;
        let _ = self.ingest_task.await;
        let _ = self.notification_task.await;
        let _ = self.prune_task.await;
        self.resource_cache.stop().await;
        info!("pipeline stopped");
        Ok(())
    }
}

/// Stand-in for the notification pipeline: consume dispatched events off the
/// bounded queue and log them. A real deployment replaces this consumer.
async fn drain_notifications(
    mut notifications: mpsc::Receiver<AlertEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            event = notifications.recv() => match event {
                Some(event) => info!(
                    rule = %event.rule_id,
                    endpoint = %event.endpoint_id,
                    level = ?event.level,
                    message = %event.message,
                    "dispatching alert notification"
                ),
                None => return,
            },
            _ = shutdown.changed() => return,
        }
    }
}
