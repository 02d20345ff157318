//! Idle eviction loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info};

use burrow_core::Result;
use burrow_kube::Orchestrator;
use burrow_registry::{Registry, TenantStatus};

use crate::Leadership;

/// Coarse pre-filter passed to the registry scan. Per-tenant budgets are
/// re-evaluated afterwards; budgets below this floor evict late.
pub const COARSE_IDLE_THRESHOLD: Duration = Duration::from_secs(300);
/// Eviction loop cadence while leading.
pub const IDLE_TICK_INTERVAL: Duration = Duration::from_secs(30);

/// Evicts pods whose tenants have been inactive past their budget.
///
/// The controller never takes the wake lock: a wake commits `Running` plus a
/// fresh activity stamp as its last step, so a tenant mid-wake is outside
/// the idle window by the time this loop can see it `Running`.
pub struct IdleController {
    registry: Arc<dyn Registry>,
    orchestrator: Arc<dyn Orchestrator>,
    leadership: Arc<dyn Leadership>,
    grace_seconds: i64,
}

impl IdleController {
    pub fn new(
        registry: Arc<dyn Registry>,
        orchestrator: Arc<dyn Orchestrator>,
        leadership: Arc<dyn Leadership>,
        grace_seconds: i64,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            leadership,
            grace_seconds,
        }
    }

    /// Eviction loop. Ticks immediately on start, then every interval, and
    /// only does work while this replica holds the lease.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("idle controller starting");
        self.maybe_tick().await;
        loop {
            tokio::select! {
                _ = tokio::time::sleep(IDLE_TICK_INTERVAL) => {
                    self.maybe_tick().await;
                }
                _ = shutdown.changed() => {
                    info!("idle controller shutting down");
                    return;
                }
            }
        }
    }

    /// Run one tick if leading. Returns whether the tick ran.
    pub async fn maybe_tick(&self) -> bool {
        if !self.leadership.is_leading() {
            return false;
        }
        if let Err(err) = self.tick().await {
            error!(error = %err, "idle tick failed");
        }
        true
    }

    /// One eviction pass over possibly idle tenants.
    pub async fn tick(&self) -> Result<()> {
        let candidates = self.registry.list_possibly_idle(COARSE_IDLE_THRESHOLD).await?;
        for tenant in candidates {
            let budget = tenant.idle_budget();
            let inactive = Utc::now().signed_duration_since(tenant.last_active_at);
            let over_budget = chrono::Duration::from_std(budget)
                .map(|b| inactive >= b)
                .unwrap_or(false);
            if !over_budget {
                debug!(tenant = %tenant.tenant_id, "within idle budget, skipping");
                continue;
            }

            info!(
                tenant = %tenant.tenant_id,
                pod = %tenant.pod_name,
                inactive_s = inactive.num_seconds(),
                "evicting idle tenant"
            );
            if let Err(err) = self
                .orchestrator
                .delete_pod(&tenant.pod_name, &tenant.namespace, self.grace_seconds)
                .await
            {
                // Leave the record Running; this tenant is re-examined on
                // the next tick.
                error!(tenant = %tenant.tenant_id, error = %err, "idle eviction: pod delete failed");
                continue;
            }
            if let Err(err) = self
                .registry
                .update_status(&tenant.tenant_id, TenantStatus::Idle, "", "")
                .await
            {
                error!(tenant = %tenant.tenant_id, error = %err, "idle eviction: status update failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::names;
    use burrow_kube::FakeOrchestrator;
    use burrow_registry::{MemoryRegistry, TenantRecord};
    use crate::StaticLeadership;

    async fn running_tenant(
        registry: &MemoryRegistry,
        orch: &FakeOrchestrator,
        id: &str,
        idle_budget_s: i64,
        inactive_s: i64,
    ) {
        let mut rec = TenantRecord::new(id, TenantStatus::Running, "tenants", "tok", idle_budget_s);
        rec.pod_name = names::pod_name(id);
        rec.pod_address = "10.0.0.5".into();
        rec.last_active_at = Utc::now() - chrono::Duration::seconds(inactive_s);
        registry.create(&rec).await.unwrap();
        orch.create_tenant_pod(id, "tenants", &names::pvc_name(id), "tok", None)
            .await
            .unwrap();
    }

    fn controller(
        registry: Arc<MemoryRegistry>,
        orch: Arc<FakeOrchestrator>,
        leadership: Arc<StaticLeadership>,
    ) -> IdleController {
        IdleController::new(registry, orch, leadership, 30)
    }

    #[tokio::test]
    async fn evicts_tenant_past_budget() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        running_tenant(&registry, &orch, "alice", 300, 600).await;

        let ctl = controller(registry.clone(), orch.clone(), Arc::new(StaticLeadership::new(true)));
        ctl.tick().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Idle);
        assert!(rec.pod_name.is_empty() && rec.pod_address.is_empty());
        assert!(!orch.pod_exists("burrow-agent-alice", "tenants").await.unwrap());
    }

    #[tokio::test]
    async fn respects_per_tenant_budget_above_the_coarse_filter() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        // Inactive 10 minutes, but this tenant's budget is 20 minutes.
        running_tenant(&registry, &orch, "alice", 1200, 600).await;

        let ctl = controller(registry.clone(), orch.clone(), Arc::new(StaticLeadership::new(true)));
        ctl.tick().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert!(orch.pod_exists("burrow-agent-alice", "tenants").await.unwrap());
    }

    #[tokio::test]
    async fn zero_budget_falls_back_to_default() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        running_tenant(&registry, &orch, "alice", 0, 600).await;
        // TenantRecord::new substitutes the default; force zero to model a
        // legacy record.
        registry.update_budget("alice", 0).await.unwrap();

        let ctl = controller(registry.clone(), orch, Arc::new(StaticLeadership::new(true)));
        ctl.tick().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Idle);
    }

    #[tokio::test]
    async fn delete_failure_leaves_record_for_next_tick() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        running_tenant(&registry, &orch, "alice", 300, 600).await;
        orch.set_delete_failure("burrow-agent-alice");

        let ctl = controller(registry.clone(), orch, Arc::new(StaticLeadership::new(true)));
        ctl.tick().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert_eq!(rec.pod_name, "burrow-agent-alice");
    }

    #[tokio::test]
    async fn followers_do_not_tick() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        running_tenant(&registry, &orch, "alice", 300, 600).await;

        let leadership = Arc::new(StaticLeadership::new(false));
        let ctl = controller(registry.clone(), orch.clone(), leadership.clone());

        assert!(!ctl.maybe_tick().await);
        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);

        // Leadership transfers; the next tick evicts.
        leadership.set(true);
        assert!(ctl.maybe_tick().await);
        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Idle);
    }

    #[tokio::test]
    async fn idempotent_delete_tolerates_vanished_pod() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        running_tenant(&registry, &orch, "alice", 300, 600).await;
        // A racing wake already replaced the pod; delete still succeeds.
        orch.vanish_pod("burrow-agent-alice", "tenants");

        let ctl = controller(registry.clone(), orch, Arc::new(StaticLeadership::new(true)));
        ctl.tick().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Idle);
    }
}
