//! End-to-end lifecycle scenarios over the control API with fake stores.
//!
//! These drive the public surface the way the fleet does: HTTP wakes, then
//! the background controllers (idle, reconcile, warm pool) against the same
//! shared state.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use tower::ServiceExt;

use burrow_api::{build_router, AppState, WakeOptions, WakePipeline};
use burrow_kube::{FakeOrchestrator, Orchestrator};
use burrow_lifecycle::{IdleController, StaticLeadership};
use burrow_lock::{AddressCache, MemoryCache, MemoryLock};
use burrow_messenger::recording::RecordingMessenger;
use burrow_reconcile::Reconciler;
use burrow_registry::{MemoryRegistry, Registry, TenantRecord, TenantStatus};
use burrow_warmpool::WarmPoolManager;

struct Cluster {
    registry: Arc<MemoryRegistry>,
    cache: Arc<MemoryCache>,
    orchestrator: Arc<FakeOrchestrator>,
    router: axum::Router,
}

fn cluster_with(orchestrator: FakeOrchestrator) -> Cluster {
    let registry = Arc::new(MemoryRegistry::new());
    let cache = Arc::new(MemoryCache::new());
    let orchestrator = Arc::new(orchestrator);
    let wake = Arc::new(WakePipeline::new(
        registry.clone(),
        Arc::new(MemoryLock::new()),
        orchestrator.clone(),
        WakeOptions {
            namespace: "tenants".into(),
            wake_lock_ttl: Duration::from_secs(5),
            pod_ready_wait: Duration::from_secs(5),
            poll_interval: Duration::from_millis(20),
        },
    ));
    let state = AppState {
        registry: registry.clone(),
        cache: cache.clone(),
        orchestrator: Some(orchestrator.clone()),
        messenger: Some(Arc::new(RecordingMessenger::new())),
        wake: Some(wake),
        namespace: "tenants".into(),
        pod_grace_seconds: 30,
    };
    Cluster {
        registry,
        cache,
        orchestrator,
        router: build_router(state),
    }
}

fn cluster() -> Cluster {
    cluster_with(FakeOrchestrator::new())
}

async fn wake(router: &axum::Router, tenant: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder()
        .method("POST")
        .uri(format!("/wake/{tenant}"))
        .body(Body::empty())
        .unwrap();
    let resp = router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), 1 << 20).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, body)
}

// S1: wake with no record provisions a pod and commits Running.
#[tokio::test]
async fn wake_cold_tenant_provisions_and_commits() {
    let c = cluster();
    c.orchestrator.set_ready_address("alice", "10.1.0.1");

    let (status, body) = wake(&c.router, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pod_address"], "10.1.0.1");

    let rec = c.registry.get("alice").await.unwrap().unwrap();
    assert_eq!(rec.status, TenantStatus::Running);
    assert_eq!(rec.pod_address, "10.1.0.1");
    assert_eq!(rec.pod_name, "burrow-agent-alice");
}

// S2: waking a running tenant returns its address without creating pods.
#[tokio::test]
async fn wake_running_tenant_is_read_only() {
    let c = cluster();
    let mut rec = TenantRecord::new("alice", TenantStatus::Running, "tenants", "tok", 300);
    rec.pod_name = "burrow-agent-alice".into();
    rec.pod_address = "10.0.0.5".into();
    c.registry.create(&rec).await.unwrap();

    let (status, body) = wake(&c.router, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pod_address"], "10.0.0.5");
    assert_eq!(c.orchestrator.creations("alice"), 0);
}

// S3: an idle tick evicts a tenant past its budget.
#[tokio::test]
async fn idle_tick_evicts_stale_tenant() {
    let c = cluster();
    c.orchestrator.set_ready_address("alice", "10.1.0.1");
    wake(&c.router, "alice").await;

    // Age the activity stamp past the 300s budget.
    let mut rec = c.registry.get("alice").await.unwrap().unwrap();
    rec.last_active_at = Utc::now() - chrono::Duration::minutes(10);
    c.registry.delete("alice").await.unwrap();
    c.registry.create(&rec).await.unwrap();

    let idle = IdleController::new(
        c.registry.clone(),
        c.orchestrator.clone(),
        Arc::new(StaticLeadership::new(true)),
        30,
    );
    idle.tick().await.unwrap();

    let rec = c.registry.get("alice").await.unwrap().unwrap();
    assert_eq!(rec.status, TenantStatus::Idle);
    assert!(rec.pod_name.is_empty() && rec.pod_address.is_empty());
    assert!(!c.orchestrator.pod_exists("burrow-agent-alice", "tenants").await.unwrap());
}

// S4: the reconciler demotes a Running record whose pod vanished and
// clears the cached address.
#[tokio::test]
async fn reconcile_repairs_vanished_pod() {
    let c = cluster();
    c.orchestrator.set_ready_address("alice", "10.1.0.1");
    wake(&c.router, "alice").await;
    c.cache.put("alice", "10.1.0.1", Duration::from_secs(300)).await.unwrap();

    c.orchestrator.vanish_pod("burrow-agent-alice", "tenants");

    let reconciler = Reconciler::new(
        c.registry.clone(),
        c.orchestrator.clone(),
        c.cache.clone(),
        "tenants",
    );
    reconciler.reconcile().await.unwrap();

    let rec = c.registry.get("alice").await.unwrap().unwrap();
    assert_eq!(rec.status, TenantStatus::Idle);
    assert!(rec.pod_name.is_empty() && rec.pod_address.is_empty());
    assert_eq!(c.cache.get("alice").await.unwrap(), None);
}

// S5: ten concurrent wakes against a cold tenant converge on one pod and
// one address.
#[tokio::test]
async fn concurrent_wakes_converge() {
    let c = cluster_with(FakeOrchestrator::with_ready_delay(Duration::from_millis(200)));
    c.orchestrator.set_ready_address("bob", "10.2.0.1");

    let results = futures::future::join_all((0..10).map(|_| {
        let router = c.router.clone();
        async move { wake(&router, "bob").await }
    }))
    .await;

    for (status, body) in results {
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pod_address"], "10.2.0.1");
    }
    assert!(c.orchestrator.pods_for_tenant("bob", "tenants").len() <= 1);
    assert_eq!(c.orchestrator.creations("bob"), 1);
}

// S6: a cold wake claims a warm pod, pins its node, deletes the
// placeholder, and the pool refills on the next convergence pass.
#[tokio::test]
async fn warm_pool_claim_and_refill() {
    let c = cluster();
    c.orchestrator.seed_warm_pod("tenants", "warm-pool-1", "n1", "10.244.9.1");
    c.orchestrator.seed_warm_pod("tenants", "warm-pool-2", "n2", "10.244.9.2");
    c.orchestrator.set_ready_address("carol", "10.3.0.1");

    let (status, _) = wake(&c.router, "carol").await;
    assert_eq!(status, StatusCode::OK);

    let node = c.orchestrator.node_hint("carol", "tenants").unwrap();
    assert!(node == "n1" || node == "n2");
    assert!(!c.orchestrator.pod_exists("warm-pool-1", "tenants").await.unwrap());
    assert_eq!(c.orchestrator.warm_count("tenants"), 1);

    let manager = WarmPoolManager::new(c.orchestrator.clone(), "tenants", 2);
    manager.reconcile().await.unwrap();
    assert_eq!(c.orchestrator.warm_count("tenants"), 2);
}

// A wake's commit refreshes activity, so the idle controller does not
// immediately evict a freshly woken tenant.
#[tokio::test]
async fn fresh_wake_survives_the_next_idle_tick() {
    let c = cluster();
    c.orchestrator.set_ready_address("alice", "10.1.0.1");
    wake(&c.router, "alice").await;

    let idle = IdleController::new(
        c.registry.clone(),
        c.orchestrator.clone(),
        Arc::new(StaticLeadership::new(true)),
        30,
    );
    idle.tick().await.unwrap();

    let rec = c.registry.get("alice").await.unwrap().unwrap();
    assert_eq!(rec.status, TenantStatus::Running);
    assert!(c.orchestrator.pod_exists("burrow-agent-alice", "tenants").await.unwrap());
}

// After an eviction, the next wake brings the tenant straight back.
#[tokio::test]
async fn evicted_tenant_wakes_again() {
    let c = cluster();
    c.orchestrator.set_ready_address("alice", "10.1.0.1");
    wake(&c.router, "alice").await;

    let mut rec = c.registry.get("alice").await.unwrap().unwrap();
    rec.last_active_at = Utc::now() - chrono::Duration::minutes(10);
    c.registry.delete("alice").await.unwrap();
    c.registry.create(&rec).await.unwrap();

    let idle = IdleController::new(
        c.registry.clone(),
        c.orchestrator.clone(),
        Arc::new(StaticLeadership::new(true)),
        30,
    );
    idle.tick().await.unwrap();
    assert_eq!(
        c.registry.get("alice").await.unwrap().unwrap().status,
        TenantStatus::Idle
    );

    let (status, body) = wake(&c.router, "alice").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pod_address"], "10.1.0.1");
    assert_eq!(
        c.registry.get("alice").await.unwrap().unwrap().status,
        TenantStatus::Running
    );
}
