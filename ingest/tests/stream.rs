use gosight_alerts::{AlertDispatcher, AlertEmitter, AlertManager, RuleEvaluator};
use gosight_cache::{
    LogCache, MetricCache, ProcessCache, ResourceCache, ResourceCacheConfig, TagCache,
};
use gosight_ingest::{IngestPipeline, IngestServer};
use gosight_model::{AlertRule, AlertState, CompareOp, Expression, MetricScope, RuleKind};
use gosight_store::{MemoryLogStore, MemoryMetricStore, MemoryResourceStore, MemoryRuleStore};
use gosight_sync::EndpointTracker;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

struct World {
    metric_cache: Arc<MetricCache>,
    tag_cache: Arc<TagCache>,
    resource_cache: ResourceCache,
    metric_store: Arc<MemoryMetricStore>,
    log_store: Arc<MemoryLogStore>,
    events: tokio::sync::broadcast::Receiver<gosight_model::AlertEvent>,
    addr: std::net::SocketAddr,
    shutdown: watch::Sender<bool>,
}

async fn start_world(rules: Vec<AlertRule>) -> World {
    let metric_cache = Arc::new(MetricCache::default());
    let tag_cache = Arc::new(TagCache::default());
    let resource_store = Arc::new(MemoryResourceStore::new());
    let resource_cache = ResourceCache::new(resource_store, ResourceCacheConfig::default());
    let process_cache = Arc::new(ProcessCache::default());
    let log_cache = Arc::new(LogCache::default());
    let metric_store = Arc::new(MemoryMetricStore::new());
    let log_store = Arc::new(MemoryLogStore::new());

    let emitter = AlertEmitter::default();
    let events = emitter.subscribe();
    let (dispatcher, _dispatched) = AlertDispatcher::new(64);
    let manager = Arc::new(AlertManager::new(emitter.clone(), dispatcher));
    let evaluator = Arc::new(RuleEvaluator::new(
        Arc::new(MemoryRuleStore::with_rules(rules)),
        manager,
    ));
    let tracker = Arc::new(EndpointTracker::new(chrono::Duration::seconds(300), emitter));

    let pipeline = Arc::new(IngestPipeline::new(
        metric_cache.clone(),
        tag_cache.clone(),
        resource_cache.clone(),
        process_cache,
        log_cache,
        metric_store.clone(),
        log_store.clone(),
        evaluator,
        tracker,
    ));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let server = IngestServer::new(pipeline);
    tokio::spawn(async move {
        server.serve(listener, shutdown_rx).await.unwrap();
    });

    World {
        metric_cache,
        tag_cache,
        resource_cache,
        metric_store,
        log_store,
        events,
        addr,
        shutdown,
    }
}

fn cpu_rule() -> AlertRule {
    AlertRule {
        id: "r-cpu".into(),
        name: "cpu high".into(),
        message: "cpu above 80".into(),
        kind: RuleKind::Metric,
        expression: Expression {
            operator: CompareOp::Gt,
            value: serde_json::json!(80),
            datatype: String::new(),
        },
        scope: MetricScope {
            namespace: "system".into(),
            subnamespace: "cpu".into(),
            metric: "usage".into(),
        },
        ..Default::default()
    }
}

/// Stream frames over a fresh connection and wait for the server ack, which
/// is only written after every frame on the connection was applied.
async fn stream_frames(addr: std::net::SocketAddr, frames: &[String]) {
    let stream = TcpStream::connect(addr).await.unwrap();
    let (reader, mut writer) = stream.into_split();
    for frame in frames {
        writer.write_all(frame.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
    }
    writer.shutdown().await.unwrap();

    let mut lines = BufReader::new(reader).lines();
    let ack = lines.next_line().await.unwrap().unwrap();
    assert!(ack.contains("ok"));
}

fn metric_frame(endpoint: &str, value: f64) -> String {
    serde_json::json!({
        "type": "metrics",
        "payload": {
            "endpoint_id": endpoint,
            "meta": {
                "endpoint_id": endpoint,
                "host_id": format!("{endpoint}-host"),
                "hostname": format!("{endpoint}.example"),
                "environment": "prod",
                "tags": {"env": "prod", "team": "core"}
            },
            "metrics": [{
                "namespace": "System",
                "subnamespace": "CPU",
                "name": "Usage",
                "type": "gauge",
                "value": value
            }]
        }
    })
    .to_string()
}

#[tokio::test]
async fn metric_stream_fans_out_to_caches_stores_and_rules() {
    let mut world = start_world(vec![cpu_rule()]).await;

    stream_frames(world.addr, &[metric_frame("ep-1", 91.5)]).await;

    // Cache side.
    assert_eq!(world.metric_cache.all_metric_names(), vec!["system.cpu.usage"]);
    let mut filters = HashMap::new();
    filters.insert("env".to_string(), "prod".to_string());
    assert_eq!(
        world.metric_cache.metrics_with_labels(&filters),
        vec!["system.cpu.usage"]
    );
    assert_eq!(world.tag_cache.values_for_key("team"), vec!["core"]);

    // Resource side: the host was derived from meta.
    let host = world.resource_cache.get("host:ep-1-host").unwrap();
    assert_eq!(host.kind, "host");
    assert_eq!(host.status, "online");

    // Store side.
    assert_eq!(world.metric_store.written(), 1);

    // Rule side: 91.5 > 80 fired exactly once.
    let event = world.events.recv().await.unwrap();
    assert_eq!(event.state, AlertState::Firing);
    assert_eq!(event.rule_id, "r-cpu");

    let _ = world.shutdown.send(true);
}

#[tokio::test]
async fn malformed_frames_are_dropped_not_fatal() {
    let mut world = start_world(vec![cpu_rule()]).await;

    stream_frames(
        world.addr,
        &[
            "this is not json".to_string(),
            r#"{"type":"traces","payload":{}}"#.to_string(),
            metric_frame("ep-2", 99.0),
        ],
    )
    .await;

    // The valid frame behind the garbage still landed.
    assert_eq!(world.metric_cache.all_metric_names(), vec!["system.cpu.usage"]);
    let event = world.events.recv().await.unwrap();
    assert_eq!(event.endpoint_id, "ep-2");

    let _ = world.shutdown.send(true);
}

#[tokio::test]
async fn log_stream_reaches_log_store_and_log_rules() {
    let rule = AlertRule {
        id: "r-log".into(),
        name: "failed logins".into(),
        message: "login failures detected".into(),
        kind: RuleKind::Log,
        expression: Expression {
            operator: CompareOp::Contains,
            value: serde_json::json!("login failed"),
            datatype: "message".into(),
        },
        ..Default::default()
    };
    let mut world = start_world(vec![rule]).await;

    let frame = serde_json::json!({
        "type": "logs",
        "payload": {
            "endpoint_id": "ep-1",
            "meta": {"endpoint_id": "ep-1"},
            "logs": [
                {"level": "error", "message": "user login failed for bob"}
            ]
        }
    })
    .to_string();
    stream_frames(world.addr, &[frame]).await;

    assert_eq!(world.log_store.written(), 1);
    let event = world.events.recv().await.unwrap();
    assert_eq!(event.state, AlertState::Firing);
    assert_eq!(event.rule_id, "r-log");

    let _ = world.shutdown.send(true);
}
