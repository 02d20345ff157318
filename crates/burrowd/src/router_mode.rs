//! Router mode: wire the cache and clients, serve the ingress API.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use burrow_core::config::RouterConfig;
use burrow_lock::{AddressCache, MemoryCache, RedisCache};
use burrow_messenger::BotApiMessenger;
use burrow_router::{OrchestratorClient, RouterState};

pub async fn run(cfg: RouterConfig) -> anyhow::Result<()> {
    info!(local_mode = cfg.local_mode, orchestrator = %cfg.orchestrator_addr, "router starting");

    let cache: Arc<dyn AddressCache> = if cfg.local_mode {
        Arc::new(MemoryCache::new())
    } else {
        Arc::new(RedisCache::connect(&cfg.lock_addr).await?)
    };

    let orchestrator = Arc::new(OrchestratorClient::new(
        &cfg.orchestrator_addr,
        cfg.wake_budget,
    )?);
    let messenger = Arc::new(BotApiMessenger::new(
        cfg.public_base.as_deref().unwrap_or_default(),
        cfg.messaging_api_base.as_deref(),
    )?);

    let state = RouterState {
        cache,
        orchestrator,
        messenger,
        http: reqwest::Client::new(),
        agent_port: cfg.agent_port,
        wake_budget: cfg.wake_budget,
    };
    let app = burrow_router::build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "router listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            crate::shutdown_signal().await;
            info!("shutdown signal received");
        })
        .await?;

    info!("router stopped");
    Ok(())
}
