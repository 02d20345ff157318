//! burrow-warmpool — placeholder workload maintenance.
//!
//! The warm pool is a replicated set of low-priority agent pods whose only
//! job is to hold a scheduled node with the image already pulled. Claiming
//! one (the relabel protocol in burrow-kube) orphans it from its controller,
//! which refills the pool automatically; this loop handles everything the
//! controller cannot: first creation, target changes, and image upgrades.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{error, info};

use burrow_core::Result;
use burrow_kube::Orchestrator;

/// Convergence cadence for the warm-pool workload.
pub const WARM_POOL_INTERVAL: Duration = Duration::from_secs(30);

/// Drives `ensure_warm_pool` on a fixed cadence.
pub struct WarmPoolManager {
    orchestrator: Arc<dyn Orchestrator>,
    namespace: String,
    target: i32,
}

impl WarmPoolManager {
    pub fn new(orchestrator: Arc<dyn Orchestrator>, namespace: &str, target: i32) -> Self {
        Self {
            orchestrator,
            namespace: namespace.to_string(),
            target,
        }
    }

    /// Convergence loop. First pass runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(target = self.target, namespace = %self.namespace, "warm pool starting");
        if let Err(err) = self.reconcile().await {
            error!(error = %err, "warm pool convergence failed");
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(WARM_POOL_INTERVAL) => {
                    if let Err(err) = self.reconcile().await {
                        error!(error = %err, "warm pool convergence failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("warm pool shutting down");
                    return;
                }
            }
        }
    }

    /// One declarative convergence pass.
    pub async fn reconcile(&self) -> Result<()> {
        self.orchestrator.ensure_warm_pool(&self.namespace, self.target).await
    }
}
