//! End-to-end scenarios exercising `Transport` against both a real mock HTTP server
//! (`httpmock`, for the wire-level path) and hand-rolled in-process `Node` stubs (for scenarios
//! that need exact control over failure sequencing no mock server can guarantee).

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, Method};
use httpmock::Method as MockMethod;
use httpmock::MockServer;

use cluster_transport::{
    ApiResponseMeta, Node, NodeConfig, NodeFactory, NodeRequest, PoolConfig, Scheme, SniffOptions,
    Transport, TransportError,
};

#[derive(Debug, Clone)]
enum StubOutcome {
    Status(u16),
    ConnectionError,
    Timeout,
}

#[derive(Debug)]
struct ScriptedNode {
    config: NodeConfig,
    outcomes: Mutex<VecDeque<StubOutcome>>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Node for ScriptedNode {
    fn config(&self) -> &NodeConfig {
        &self.config
    }

    fn base_url(&self) -> &str {
        "stub"
    }

    async fn perform_request(
        &self,
        req: NodeRequest<'_>,
    ) -> Result<(ApiResponseMeta, Bytes), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(StubOutcome::Status(200));
        match outcome {
            StubOutcome::ConnectionError => Err(TransportError::ConnectionError(Box::new(
                std::io::Error::other("refused"),
            ))),
            StubOutcome::Timeout => Err(TransportError::ConnectionTimeout(Duration::from_millis(1))),
            StubOutcome::Status(status) => {
                let is_head = req.method == Method::HEAD;
                Ok((
                    ApiResponseMeta {
                        node: self.config.clone(),
                        duration: Duration::ZERO,
                        http_version: "HTTP/1.1".to_owned(),
                        status,
                        headers: HeaderMap::new(),
                        mimetype: None,
                    },
                    if is_head { Bytes::new() } else { Bytes::new() },
                ))
            }
        }
    }

    async fn close(&self) {}
}

fn seed(host: &str) -> NodeConfig {
    NodeConfig::new(Scheme::Http, host, 9200)
}

fn scripted_factory(
    scripts: HashMap<String, Vec<StubOutcome>>,
    calls: Arc<AtomicUsize>,
) -> NodeFactory {
    let scripts: Arc<Mutex<HashMap<String, Vec<StubOutcome>>>> = Arc::new(Mutex::new(scripts));
    Arc::new(move |config| {
        let outcomes = scripts
            .lock()
            .unwrap()
            .remove(&config.host)
            .unwrap_or_default();
        Ok(Arc::new(ScriptedNode {
            config,
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            calls: Arc::clone(&calls),
        }) as Arc<dyn Node>)
    })
}

/// Scenario 2 (§8): four seeds returning 404/401/403/555 in selector order, `retry_on_status`
/// covering the first three. The final error should be the unretryable 555 with three
/// accumulated prior errors.
#[tokio::test]
async fn retry_on_status_round_robin() {
    let calls = Arc::new(AtomicUsize::new(0));
    let nodes = vec![seed("n404"), seed("n401"), seed("n403"), seed("n555")];
    let mut scripts = HashMap::new();
    scripts.insert("n404".to_owned(), vec![StubOutcome::Status(404)]);
    scripts.insert("n401".to_owned(), vec![StubOutcome::Status(401)]);
    scripts.insert("n403".to_owned(), vec![StubOutcome::Status(403)]);
    scripts.insert("n555".to_owned(), vec![StubOutcome::Status(555)]);
    let factory = scripted_factory(scripts, Arc::clone(&calls));

    let mut pool_cfg = PoolConfig::for_testing();
    pool_cfg.randomize_nodes = false;

    let transport = Transport::builder(nodes)
        .node_factory(factory)
        .pool_config(pool_cfg)
        .retry_on_status(vec![401, 403, 404])
        .max_retries(5)
        .build()
        .await
        .unwrap();

    let err = transport
        .perform_request(Method::GET, "/", None, None, None, Vec::new())
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(555));
    match err {
        TransportError::RetriesExhausted { errors, .. } => {
            let statuses: Vec<u16> = errors.iter().filter_map(TransportError::status).collect();
            let mut sorted = statuses.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, vec![401, 403, 404]);
        }
        other => panic!("expected RetriesExhausted, got {other:?}"),
    }
}

/// Scenario 6 (§8): a single seed, a sniff callback that returns one duplicate config and one
/// new one. After a request that triggers the before-request sniff, the pool should own both.
#[tokio::test]
async fn sniff_before_requests_merges_new_nodes() {
    let calls = Arc::new(AtomicUsize::new(0));
    let a = seed("a");
    let b = seed("b");
    let mut scripts = HashMap::new();
    scripts.insert("a".to_owned(), vec![StubOutcome::Status(200), StubOutcome::Status(200)]);
    scripts.insert("b".to_owned(), vec![StubOutcome::Status(200)]);
    let factory = scripted_factory(scripts, Arc::clone(&calls));

    let a_for_cb = a.clone();
    let b_for_cb = b.clone();
    let sniff_calls = Arc::new(AtomicUsize::new(0));
    let sniff_calls_cb = Arc::clone(&sniff_calls);
    let callback: cluster_transport::SniffCallback = Arc::new(move |_opts: SniffOptions| {
        sniff_calls_cb.fetch_add(1, Ordering::SeqCst);
        let a = a_for_cb.clone();
        let b = b_for_cb.clone();
        Box::pin(async move { Ok(vec![a, b]) })
    });

    let mut pool_cfg = PoolConfig::for_testing();
    pool_cfg.randomize_nodes = false;

    let transport = Transport::builder(vec![a])
        .node_factory(factory)
        .pool_config(pool_cfg)
        .sniff_before_requests(true)
        .sniff_callback(callback)
        .min_delay_between_sniffing(Duration::ZERO)
        .build()
        .await
        .unwrap();

    let (meta, _) = transport
        .perform_request(Method::GET, "/", None, None, None, Vec::new())
        .await
        .unwrap();
    assert!(meta.is_success());
    assert_eq!(transport.all_nodes().len(), 2);
    assert!(sniff_calls.load(Ordering::SeqCst) >= 1);
}

/// Scenario 7 (§8): many concurrent tasks hammering a pool with all sniff triggers enabled;
/// expect no deadlock and a stable node count.
#[tokio::test]
async fn threaded_stress_with_sniffing_enabled() {
    let calls = Arc::new(AtomicUsize::new(0));
    let seeds: Vec<NodeConfig> = (0..4).map(|i| seed(&format!("s{i}"))).collect();
    let mut scripts = HashMap::new();
    for (i, cfg) in seeds.iter().enumerate() {
        let status = if i == 0 { 500 } else { 200 };
        let outcomes: Vec<StubOutcome> = (0..10_000).map(|_| StubOutcome::Status(status)).collect();
        scripts.insert(cfg.host.clone(), outcomes);
    }
    let factory = scripted_factory(scripts, Arc::clone(&calls));

    let callback: cluster_transport::SniffCallback =
        Arc::new(|_opts: SniffOptions| Box::pin(async move { Ok(Vec::new()) }));

    let transport = Arc::new(
        Transport::builder(seeds)
            .node_factory(factory)
            .pool_config(PoolConfig::for_testing())
            .retry_on_status(vec![500])
            .max_retries(3)
            .sniff_on_node_failure(true)
            .sniff_before_requests(true)
            .sniff_callback(callback)
            .min_delay_between_sniffing(Duration::from_millis(5))
            .build()
            .await
            .unwrap(),
    );

    let success_count = Arc::new(AtomicUsize::new(0));
    let mut handles = Vec::new();
    for _ in 0..16 {
        let transport = Arc::clone(&transport);
        let success_count = Arc::clone(&success_count);
        handles.push(tokio::spawn(async move {
            let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
            while tokio::time::Instant::now() < deadline {
                if transport
                    .perform_request(Method::GET, "/", None, None, None, Vec::new())
                    .await
                    .is_ok()
                {
                    success_count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    assert!(success_count.load(Ordering::SeqCst) >= 1000);
    assert_eq!(transport.all_nodes().len(), 4);
}

/// Real-wire smoke test: `HyperNode` (the default backend) against an `httpmock` server.
#[tokio::test]
async fn hyper_node_round_trip_against_mock_server() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(MockMethod::GET).path("/_cluster/health");
        then.status(200)
            .header("content-type", "application/json")
            .json_body(serde_json::json!({"status": "green"}));
    });

    let node_config = NodeConfig::new(Scheme::Http, server.address().ip().to_string(), server.port());
    let transport = Transport::builder(vec![node_config]).build().await.unwrap();

    let (meta, body) = transport
        .perform_request(Method::GET, "/_cluster/health", None, None, None, Vec::new())
        .await
        .unwrap();

    assert_eq!(meta.status, 200);
    match body {
        Some(cluster_transport::ResponseBody::Decoded(value)) => {
            assert_eq!(value["status"], "green");
        }
        other => panic!("expected a decoded JSON body, got {other:?}"),
    }
}

/// HEAD against a real server: native HEAD semantics, no body decoded.
#[tokio::test]
async fn hyper_node_head_request_has_no_body() {
    let server = MockServer::start();
    let _m = server.mock(|when, then| {
        when.method(MockMethod::HEAD).path("/index");
        then.status(200);
    });

    let node_config = NodeConfig::new(Scheme::Http, server.address().ip().to_string(), server.port());
    let transport = Transport::builder(vec![node_config]).build().await.unwrap();

    let (meta, body) = transport
        .perform_request(Method::HEAD, "/index", None, None, None, Vec::new())
        .await
        .unwrap();
    assert_eq!(meta.status, 200);
    assert!(body.is_none());
}
