use crate::frame::WireFrame;
use chrono::Utc;
use gosight_alerts::RuleEvaluator;
use gosight_cache::{LogCache, MetricCache, ProcessCache, ResourceCache, TagCache};
use gosight_model::{
    container_resource_id, host_resource_id, LogPayload, Meta, MetricPayload, ProcessSnapshot,
    Resource,
};
use gosight_store::{LogStore, MetricStore};
use gosight_sync::EndpointTracker;
use metrics::counter;
use std::sync::Arc;
use tracing::warn;

/// Sequential fan-out for one payload: caches, then stores, then rules.
///
/// The pipeline owns nothing exclusively; every collaborator is shared with
/// the query side and the sync loops.
pub struct IngestPipeline {
    metric_cache: Arc<MetricCache>,
    tag_cache: Arc<TagCache>,
    resource_cache: ResourceCache,
    process_cache: Arc<ProcessCache>,
    log_cache: Arc<LogCache>,
    metric_store: Arc<dyn MetricStore>,
    log_store: Arc<dyn LogStore>,
    evaluator: Arc<RuleEvaluator>,
    tracker: Arc<EndpointTracker>,
}

impl IngestPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metric_cache: Arc<MetricCache>,
        tag_cache: Arc<TagCache>,
        resource_cache: ResourceCache,
        process_cache: Arc<ProcessCache>,
        log_cache: Arc<LogCache>,
        metric_store: Arc<dyn MetricStore>,
        log_store: Arc<dyn LogStore>,
        evaluator: Arc<RuleEvaluator>,
        tracker: Arc<EndpointTracker>,
    ) -> Self {
        Self {
            metric_cache,
            tag_cache,
            resource_cache,
            process_cache,
            log_cache,
            metric_store,
            log_store,
            evaluator,
            tracker,
        }
    }

    pub async fn handle_frame(&self, frame: WireFrame) {
        counter!("gosight_ingest_frames_total", 1, "kind" => frame.kind());
        match frame {
            WireFrame::Metrics(payload) => self.handle_metrics(payload).await,
            WireFrame::Logs(payload) => self.handle_logs(payload).await,
            WireFrame::Processes(snapshot) => self.handle_processes(snapshot),
        }
    }

    pub async fn handle_metrics(&self, payload: MetricPayload) {
        self.metric_cache.add(&payload);
        self.tag_cache.add(&payload);
        for resource in resources_from_meta(&payload.meta) {
            self.resource_cache.upsert(resource);
        }
        self.tracker.observe(&payload.meta);

        if let Err(err) = self.metric_store.write(std::slice::from_ref(&payload)).await {
            // Best-effort: the stream keeps flowing, the caches stay warm.
            warn!(error = %err, endpoint = %payload.endpoint_id, "metric store write failed");
        }
        self.evaluator.evaluate_metrics(&payload);
    }

    pub async fn handle_logs(&self, payload: LogPayload) {
        self.log_cache.add(&payload);
        self.tracker.observe(&payload.meta);

        if let Err(err) = self.log_store.write(std::slice::from_ref(&payload)).await {
            warn!(error = %err, endpoint = %payload.endpoint_id, "log store write failed");
        }
        self.evaluator.evaluate_logs(&payload);
    }

    pub fn handle_processes(&self, snapshot: ProcessSnapshot) {
        self.tracker.observe(&snapshot.meta);
        self.process_cache.add(snapshot);
    }
}

/// Derive the monitored resources behind an emitter: the host, plus the
/// container when the payload came from one (parented to the host).
fn resources_from_meta(meta: &Meta) -> Vec<Resource> {
    let mut resources = Vec::with_capacity(2);
    let now = Utc::now();
    let host_id = host_resource_id(meta);

    let mut host = Resource::new(host_id.clone(), "host");
    host.name = meta.hostname.clone();
    host.display_name = meta.hostname.clone();
    host.status = "online".to_string();
    host.last_seen = now;
    host.os = meta.os.clone();
    host.arch = meta.architecture.clone();
    host.platform = meta.platform.clone();
    host.ip_address = meta.ip_address.clone();
    host.environment = meta.environment.clone();
    host.cluster = meta.cluster_name.clone();
    host.tags = meta.tags.clone();
    if !meta.environment.is_empty() {
        host.labels.insert("env".to_string(), meta.environment.clone());
    }
    if !meta.region.is_empty() {
        host.labels.insert("region".to_string(), meta.region.clone());
    }
    if !meta.availability_zone.is_empty() {
        host.labels
            .insert("zone".to_string(), meta.availability_zone.clone());
    }
    resources.push(host);

    if meta.is_container() {
        let mut container = Resource::new(container_resource_id(meta), "container");
        container.parent_id = host_id;
        container.name = meta.container_name.clone();
        container.display_name = meta.container_name.clone();
        container.status = "online".to_string();
        container.last_seen = now;
        container.namespace = meta.namespace.clone();
        container.cluster = meta.cluster_name.clone();
        container.environment = meta.environment.clone();
        container.tags = meta.tags.clone();
        if !meta.environment.is_empty() {
            container
                .labels
                .insert("env".to_string(), meta.environment.clone());
        }
        if !meta.pod_name.is_empty() {
            container
                .labels
                .insert("pod".to_string(), meta.pod_name.clone());
        }
        if !meta.namespace.is_empty() {
            container
                .labels
                .insert("namespace".to_string(), meta.namespace.clone());
        }
        resources.push(container);
    }

    resources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_emitters_yield_parented_pair() {
        let meta = Meta {
            endpoint_id: "ep-1".into(),
            host_id: "h-1".into(),
            hostname: "web-01".into(),
            container_id: "c-9".into(),
            container_name: "api".into(),
            namespace: "prod-ns".into(),
            environment: "prod".into(),
            ..Default::default()
        };
        let resources = resources_from_meta(&meta);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].id, "host:h-1");
        assert_eq!(resources[1].id, "container:c-9");
        assert_eq!(resources[1].parent_id, "host:h-1");
        assert_eq!(
            resources[1].labels.get("namespace").map(String::as_str),
            Some("prod-ns")
        );
    }

    #[test]
    fn bare_hosts_yield_single_resource() {
        let meta = Meta {
            endpoint_id: "ep-1".into(),
            hostname: "web-01".into(),
            ..Default::default()
        };
        let resources = resources_from_meta(&meta);
        assert_eq!(resources.len(), 1);
        assert_eq!(resources[0].kind, "host");
        assert_eq!(resources[0].id, "host:ep-1");
    }
}
