//! Orchestrator mode: wire the stores, start the background controllers,
//! serve the control API.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use burrow_api::{AppState, WakeOptions, WakePipeline};
use burrow_core::config::OrchestratorConfig;
use burrow_kube::{ClientConfig, KubeOrchestrator, Orchestrator};
use burrow_lifecycle::{IdleController, LeaseElector, Leadership};
use burrow_lock::{
    AddressCache, MemoryCache, MemoryLock, RedisCache, RedisLock, WakeLock,
};
use burrow_messenger::{BotApiMessenger, Messenger};
use burrow_reconcile::Reconciler;
use burrow_registry::{MemoryRegistry, RedisRegistry, Registry};
use burrow_warmpool::WarmPoolManager;

pub async fn run(cfg: OrchestratorConfig) -> anyhow::Result<()> {
    info!(local_mode = cfg.local_mode, namespace = %cfg.namespace, "orchestrator starting");

    // ── Stores ─────────────────────────────────────────────────────
    let (registry, lock, cache): (Arc<dyn Registry>, Arc<dyn WakeLock>, Arc<dyn AddressCache>) =
        if cfg.local_mode {
            info!("local mode: in-memory registry, lock, and cache");
            (
                Arc::new(MemoryRegistry::new()),
                Arc::new(MemoryLock::new()),
                Arc::new(MemoryCache::new()),
            )
        } else {
            let registry = RedisRegistry::connect(&cfg.registry_addr, &cfg.registry_table).await?;
            let conn = burrow_lock::manager(&cfg.lock_addr).await?;
            (
                Arc::new(registry),
                Arc::new(RedisLock::new(conn.clone())),
                Arc::new(RedisCache::new(conn)),
            )
        };

    // ── Container platform ─────────────────────────────────────────
    // Local mode still uses a kubeconfig when one is reachable; without
    // one, pod operations are disabled and wake answers 503.
    let kube_client = match kube::Client::try_default().await {
        Ok(client) => Some(client),
        Err(err) if cfg.local_mode => {
            warn!(error = %err, "no cluster access; pod operations disabled");
            None
        }
        Err(err) => return Err(err.into()),
    };
    let orchestrator: Option<Arc<dyn Orchestrator>> = kube_client.clone().map(|client| {
        Arc::new(KubeOrchestrator::new(
            client,
            ClientConfig {
                agent_image: cfg.agent_image.clone(),
                runtime_class: cfg.isolation_runtime.clone(),
                storage_bucket: cfg.storage_bucket.clone(),
                pod_grace_seconds: cfg.pod_grace_seconds,
            },
        )) as Arc<dyn Orchestrator>
    });

    let messenger: Option<Arc<dyn Messenger>> = match &cfg.router_public_base {
        Some(base) => Some(Arc::new(BotApiMessenger::new(
            base,
            cfg.messaging_api_base.as_deref(),
        )?)),
        None => None,
    };

    // ── Background controllers ─────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if let (Some(orch), Some(client)) = (&orchestrator, &kube_client) {
        if cfg.warm_pool_target > 0 {
            let manager =
                WarmPoolManager::new(orch.clone(), &cfg.namespace, cfg.warm_pool_target);
            let rx = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move { manager.run(rx).await }));
        }

        // Idle eviction is single-writer: gate it on the cluster lease.
        let elector = Arc::new(LeaseElector::new(
            client.clone(),
            &cfg.namespace,
            &cfg.leader_id,
        ));
        let rx = shutdown_rx.clone();
        let elector_task = elector.clone();
        tasks.push(tokio::spawn(async move { elector_task.run(rx).await }));
        let leadership: Arc<dyn Leadership> = elector;
        let idle = IdleController::new(
            registry.clone(),
            orch.clone(),
            leadership,
            cfg.pod_grace_seconds,
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { idle.run(rx).await }));

        // Drift repair runs on every replica; never behind the lease.
        let reconciler =
            Reconciler::new(registry.clone(), orch.clone(), cache.clone(), &cfg.namespace);
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move { reconciler.run(rx).await }));
    }

    // ── Control API ────────────────────────────────────────────────
    let wake = orchestrator.as_ref().map(|orch| {
        Arc::new(WakePipeline::new(
            registry.clone(),
            lock.clone(),
            orch.clone(),
            WakeOptions::new(&cfg.namespace, cfg.wake_lock_ttl, cfg.pod_ready_wait),
        ))
    });
    let state = AppState {
        registry,
        cache,
        orchestrator,
        messenger,
        wake,
        namespace: cfg.namespace.clone(),
        pod_grace_seconds: cfg.pod_grace_seconds,
    };
    let app = burrow_api::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "orchestrator listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            crate::shutdown_signal().await;
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    for task in tasks {
        let _ = task.await;
    }
    info!("orchestrator stopped");
    Ok(())
}
