//! Session pool integration tests against mock MCP backends
//!
//! Covers the handshake, mutual exclusion, the cap, the overflow valve,
//! idle expiry and shutdown.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use pretty_assertions::assert_eq;
use tokio::sync::Mutex;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpadapter_core::PoolSettings;
use mcpadapter_gateway::{PoolError, SessionPool, SessionStatus};
use tests::{init_test_tracing, MockMcpBackend};

fn settings(max_sessions: usize, wait_timeout_ms: u64, allow_overflow: bool) -> PoolSettings {
    PoolSettings {
        max_sessions,
        wait_timeout_ms,
        allow_overflow,
        ..PoolSettings::default()
    }
}

fn pool_for(url: &str, settings: PoolSettings) -> Arc<SessionPool> {
    Arc::new(SessionPool::new(url, settings))
}

#[tokio::test]
async fn test_handshake_adopts_backend_session_id() {
    init_test_tracing();
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(2, 1_000, false));

    let lease = pool.acquire("req-1").await.unwrap();

    assert_eq!(lease.session_id(), "backend-session-1");
    assert_eq!(pool.status_of("backend-session-1"), Some(SessionStatus::Busy));

    let notifications = backend.rpc_requests("notifications/initialized").await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0]
            .headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok()),
        Some("backend-session-1")
    );
}

#[tokio::test]
async fn test_released_session_is_reused() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(2, 1_000, false));

    let first = pool.acquire("req-1").await.unwrap();
    let first_id = first.session_id().to_string();
    first.release();
    assert_eq!(pool.status_of(&first_id), Some(SessionStatus::Available));

    let second = pool.acquire("req-2").await.unwrap();
    assert_eq!(second.session_id(), first_id);
    assert_eq!(backend.initializations(), 1);
}

#[tokio::test]
async fn test_missing_session_header_gets_local_id() {
    let backend = MockMcpBackend::start_stateless().await;
    let pool = pool_for(&backend.url(), settings(2, 1_000, false));

    let lease = pool.acquire("req-1").await.unwrap();
    assert!(
        lease.session_id().starts_with("gateway-"),
        "unexpected id {}",
        lease.session_id()
    );
}

#[tokio::test]
async fn test_handshake_failure_frees_the_slot() {
    let server = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    let pool = pool_for(&server.uri(), settings(1, 5_000, false));

    for request in ["req-1", "req-2"] {
        // A leaked reservation would make the second attempt wait for 5s
        let outcome = tokio::time::timeout(Duration::from_secs(2), pool.acquire(request))
            .await
            .expect("acquire should not wait on a freed slot");
        assert!(matches!(outcome, Err(PoolError::Handshake { .. })));
    }

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.total_sessions, 0);
    assert_eq!(snapshot.initializing_sessions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_mutual_exclusion_and_cap_under_load() {
    init_test_tracing();
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(3, 10_000, false));
    let held: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));

    let tasks = (0..12).map(|i| {
        let pool = Arc::clone(&pool);
        let held = Arc::clone(&held);
        tokio::spawn(async move {
            let lease = pool.acquire(&format!("req-{}", i)).await.unwrap();
            assert!(
                held.lock().await.insert(lease.session_id().to_string()),
                "session {} handed out twice",
                lease.session_id()
            );
            tokio::time::sleep(Duration::from_millis(50)).await;
            held.lock().await.remove(lease.session_id());
            lease.release();
        })
    });
    for result in join_all(tasks).await {
        result.unwrap();
    }

    let snapshot = pool.snapshot();
    assert!(snapshot.total_sessions <= 3);
    assert_eq!(snapshot.busy_sessions, 0);
    assert_eq!(snapshot.emergency_sessions, 0);
    assert!(backend.initializations() <= 3);
}

#[tokio::test]
async fn test_overflow_creates_emergency_session() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(1, 200, true));

    let held = pool.acquire("req-1").await.unwrap();
    let emergency = pool.acquire("req-2").await.unwrap();

    assert!(!held.is_emergency());
    assert!(emergency.is_emergency());
    assert_ne!(held.session_id(), emergency.session_id());
    assert_eq!(pool.session_count(), 2);
    assert_eq!(pool.snapshot().emergency_sessions, 1);
}

#[tokio::test]
async fn test_without_overflow_wait_times_out() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(1, 200, false));

    let _held = pool.acquire("req-1").await.unwrap();
    let err = pool.acquire("req-2").await.unwrap_err();

    assert!(matches!(err, PoolError::Exhausted { .. }));
    assert_eq!(pool.session_count(), 1);
    assert_eq!(backend.initializations(), 1);
}

#[tokio::test]
async fn test_idle_sessions_expire_but_busy_ones_stay() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(
        &backend.url(),
        PoolSettings {
            idle_timeout_secs: 1,
            ..settings(2, 1_000, false)
        },
    );

    let busy = pool.acquire("req-busy").await.unwrap();
    let idle = pool.acquire("req-idle").await.unwrap();
    let idle_id = idle.session_id().to_string();
    idle.release();

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(pool.sweep_expired().await, 1);

    assert_eq!(pool.status_of(&idle_id), None);
    assert_eq!(pool.status_of(busy.session_id()), Some(SessionStatus::Busy));

    let terminations = backend.terminations().await;
    assert_eq!(terminations.len(), 1);
    assert_eq!(
        terminations[0]
            .headers
            .get("mcp-session-id")
            .and_then(|v| v.to_str().ok()),
        Some(idle_id.as_str())
    );
}

#[tokio::test]
async fn test_background_sweep_starts_with_first_session() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(
        &backend.url(),
        PoolSettings {
            idle_timeout_secs: 1,
            sweep_interval_secs: 1,
            ..settings(2, 1_000, false)
        },
    );
    assert!(!pool.snapshot().sweep_running);

    pool.acquire("req-1").await.unwrap().release();
    assert!(pool.snapshot().sweep_running);

    tokio::time::sleep(Duration::from_millis(2_500)).await;
    assert_eq!(pool.session_count(), 0);
}

#[tokio::test]
async fn test_shutdown_terminates_sessions() {
    let backend = MockMcpBackend::start().await;
    let pool = pool_for(&backend.url(), settings(2, 1_000, false));

    let a = pool.acquire("req-1").await.unwrap();
    let b = pool.acquire("req-2").await.unwrap();
    a.release();
    b.release();

    pool.shutdown().await;

    assert_eq!(pool.session_count(), 0);
    assert_eq!(backend.terminations().await.len(), 2);
    assert!(matches!(
        pool.acquire("req-3").await,
        Err(PoolError::ShutDown(_))
    ));
}
