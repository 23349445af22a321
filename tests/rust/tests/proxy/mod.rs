//! Backend call proxy integration tests
//!
//! Every call, whatever its outcome, must hand its session back to the pool.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::ResponseTemplate;

use mcpadapter_core::{BackendDefinition, PoolSettings};
use mcpadapter_gateway::{
    BackendCallProxy, BackendReply, PoolRegistry, ProxyError, ToolDiscovery, ToolRegistry,
};
use tests::backend::{log_notification, sse, sse_stream, text_result};
use tests::{init_test_tracing, MockMcpBackend};

struct Harness {
    tools: Arc<ToolRegistry>,
    pools: Arc<PoolRegistry>,
    proxy: BackendCallProxy,
}

impl Harness {
    fn new(settings: PoolSettings) -> Self {
        let tools = Arc::new(ToolRegistry::new());
        let pools = Arc::new(PoolRegistry::new(settings));
        let proxy = BackendCallProxy::new(Arc::clone(&tools), Arc::clone(&pools));
        Self {
            tools,
            pools,
            proxy,
        }
    }

    async fn discover(&self, backends: Vec<BackendDefinition>) {
        ToolDiscovery::new(backends)
            .discover_all(&self.tools)
            .await;
    }

    /// Busy sessions across every pool
    fn busy_sessions(&self) -> usize {
        self.pools
            .snapshots()
            .iter()
            .map(|s| s.busy_sessions)
            .sum()
    }
}

async fn hello_backend() -> (MockMcpBackend, BackendDefinition) {
    let backend = MockMcpBackend::start().await;
    backend.with_info(&["greet", "echo"]).await;
    backend.with_greet(Duration::ZERO).await;
    let definition = BackendDefinition::new("hello", &backend.url()).unwrap();
    (backend, definition)
}

#[tokio::test]
async fn test_hello_greet_round_trip() {
    init_test_tracing();
    let (backend, hello) = hello_backend().await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let reply = harness
        .proxy
        .call_tool("hello_greet", json!({"name": "World"}))
        .await
        .unwrap();

    assert_eq!(reply, BackendReply::Text("Hello, World!".to_string()));
    assert_eq!(harness.busy_sessions(), 0);

    // The backend saw its native name and our session header
    let calls = backend.rpc_requests("tools/call").await;
    assert_eq!(calls.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&calls[0].body).unwrap();
    assert_eq!(body["params"]["name"], "greet");
    assert_eq!(
        calls[0]
            .headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok()),
        Some("backend-session-1")
    );
}

#[tokio::test]
async fn test_plain_json_reply_and_bare_result() {
    let (backend, hello) = hello_backend().await;
    backend
        .with_tool_response("echo", |id| {
            ResponseTemplate::new(200)
                .set_body_json(json!({"jsonrpc": "2.0", "id": id, "result": {"echo": [1, 2]}}))
        })
        .await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let reply = harness
        .proxy
        .call_tool("hello_echo", json!({}))
        .await
        .unwrap();
    assert_eq!(reply.into_text(), r#"{"echo":[1,2]}"#);
}

#[tokio::test]
async fn test_notifications_before_the_reply_are_skipped() {
    let (backend, hello) = hello_backend().await;
    backend
        .with_tool_response("echo", |id| {
            sse_stream(&[
                log_notification("echo starting"),
                text_result(id, "Hello, World!"),
            ])
        })
        .await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let reply = harness
        .proxy
        .call_tool("hello_echo", json!({}))
        .await
        .unwrap();

    assert_eq!(reply, BackendReply::Text("Hello, World!".to_string()));
    assert_eq!(harness.busy_sessions(), 0);
}

#[tokio::test]
async fn test_unknown_tool_touches_no_pool() {
    let (_backend, hello) = hello_backend().await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let err = harness
        .proxy
        .call_tool("hello_missing", json!({}))
        .await
        .unwrap_err();

    match err {
        ProxyError::ToolNotFound { name, available } => {
            assert_eq!(name, "hello_missing");
            assert_eq!(available, vec!["hello_echo", "hello_greet"]);
        }
        other => panic!("expected ToolNotFound, got {:?}", other),
    }
    assert!(harness.pools.is_empty());
}

#[tokio::test]
async fn test_backend_error_releases_session() {
    let (backend, hello) = hello_backend().await;
    backend
        .with_tool_response("echo", |id| {
            sse(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32602, "message": "bad arguments"}
            }))
        })
        .await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let err = harness
        .proxy
        .call_tool("hello_echo", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Backend(_)));
    assert!(err.to_string().contains("bad arguments"));
    assert_eq!(harness.busy_sessions(), 0);
}

#[tokio::test]
async fn test_http_error_releases_session() {
    let (backend, hello) = hello_backend().await;
    backend
        .with_tool_response("echo", |_| {
            ResponseTemplate::new(502).set_body_string("upstream down")
        })
        .await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let err = harness
        .proxy
        .call_tool("hello_echo", json!({}))
        .await
        .unwrap_err();

    match err {
        ProxyError::HttpStatus { status, body } => {
            assert_eq!(status, 502);
            assert_eq!(body, "upstream down");
        }
        other => panic!("expected HttpStatus, got {:?}", other),
    }
    assert_eq!(harness.busy_sessions(), 0);
}

#[tokio::test]
async fn test_malformed_reply_releases_session() {
    let (backend, hello) = hello_backend().await;
    backend
        .with_tool_response("echo", |_| {
            ResponseTemplate::new(200).set_body_raw(b"<html>oops</html>".to_vec(), "text/html")
        })
        .await;
    let harness = Harness::new(PoolSettings::default());
    harness.discover(vec![hello]).await;

    let err = harness
        .proxy
        .call_tool("hello_echo", json!({}))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::MalformedReply(_)));
    assert_eq!(harness.busy_sessions(), 0);

    // The released session serves the next call
    let reply = harness
        .proxy
        .call_tool("hello_greet", json!({"name": "again"}))
        .await
        .unwrap();
    assert_eq!(reply.into_text(), "Hello, again!");
    assert_eq!(backend.initializations(), 1);
}

#[tokio::test]
async fn test_timeout_releases_session() {
    let backend = MockMcpBackend::start().await;
    backend.with_info(&["greet"]).await;
    backend.with_greet(Duration::from_secs(5)).await;
    let hello = BackendDefinition::new("hello", &backend.url()).unwrap();

    let harness = Harness::new(PoolSettings::default());
    let proxy = BackendCallProxy::new(Arc::clone(&harness.tools), Arc::clone(&harness.pools))
        .with_call_timeout(Duration::from_millis(200));
    harness.discover(vec![hello]).await;

    let err = proxy
        .call_tool("hello_greet", json!({"name": "slow"}))
        .await
        .unwrap_err();

    assert!(matches!(err, ProxyError::Timeout { .. }));
    assert_eq!(harness.busy_sessions(), 0);
}

#[tokio::test]
async fn test_cancelled_call_releases_session() {
    let backend = MockMcpBackend::start().await;
    backend.with_greet(Duration::from_secs(5)).await;
    let harness = Harness::new(PoolSettings::default());

    let url = backend.url();
    let call = harness
        .proxy
        .call_backend_tool(&url, "greet", json!({"name": "gone"}));
    assert!(tokio::time::timeout(Duration::from_millis(300), call)
        .await
        .is_err());

    assert_eq!(harness.busy_sessions(), 0);
    assert_eq!(harness.pools.snapshots()[0].available_sessions, 1);
}

#[tokio::test]
async fn test_stateless_backend_receives_no_session_header() {
    let backend = MockMcpBackend::start_stateless().await;
    backend.with_greet(Duration::ZERO).await;
    let harness = Harness::new(PoolSettings::default());

    let reply = harness
        .proxy
        .call_backend_tool(&backend.url(), "greet", json!({}))
        .await
        .unwrap();
    assert_eq!(reply.into_text(), "Hello, World!");

    let calls = backend.rpc_requests("tools/call").await;
    assert!(calls[0].headers.get("mcp-session-id").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_calls_respect_cap() {
    let backend = MockMcpBackend::start().await;
    backend.with_info(&["greet"]).await;
    backend.with_greet(Duration::from_millis(100)).await;
    let hello = BackendDefinition::new("hello", &backend.url()).unwrap();

    let harness = Arc::new(Harness::new(PoolSettings {
        max_sessions: 2,
        allow_overflow: false,
        ..PoolSettings::default()
    }));
    harness.discover(vec![hello]).await;

    let calls = (0..8).map(|i| {
        let harness = Arc::clone(&harness);
        tokio::spawn(async move {
            harness
                .proxy
                .call_tool("hello_greet", json!({"name": format!("caller-{}", i)}))
                .await
        })
    });
    let replies = futures::future::join_all(calls).await;

    for (i, reply) in replies.into_iter().enumerate() {
        assert_eq!(
            reply.unwrap().unwrap().into_text(),
            format!("Hello, caller-{}!", i)
        );
    }
    assert!(backend.initializations() <= 2);
    assert_eq!(harness.busy_sessions(), 0);
}

#[tokio::test]
async fn test_discovery_survives_unreachable_backend() {
    let (_backend, hello) = hello_backend().await;
    let dead = BackendDefinition::new("dead", "http://127.0.0.1:1").unwrap();

    let tools = ToolRegistry::new();
    let report = ToolDiscovery::new(vec![hello, dead])
        .with_timeout(Duration::from_secs(2))
        .discover_all(&tools)
        .await;

    assert_eq!(tools.names(), vec!["hello_echo", "hello_greet"]);
    let failed: Vec<&str> = report
        .failed_backends()
        .map(|b| b.backend_id.as_str())
        .collect();
    assert_eq!(failed, vec!["dead"]);
}
