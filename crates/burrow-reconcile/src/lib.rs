//! burrow-reconcile — registry/cluster drift repair.
//!
//! A record can say `Running` while the pod is gone: an eviction crashed
//! between pod delete and status write, a node disappeared, an operator
//! deleted the pod by hand. This loop demotes such records to `Idle` and
//! drops their cached addresses. Every replica runs it: the work is
//! idempotent, two replicas demoting the same record perform the same
//! transition. It must not depend on the leader lease — drift repair has to
//! keep happening while the leader is partitioned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use burrow_core::{names, Result};
use burrow_kube::Orchestrator;
use burrow_lock::AddressCache;
use burrow_registry::{Registry, TenantStatus};

/// Reconcile pass cadence.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Demotes `Running` records whose pods have vanished.
pub struct Reconciler {
    registry: Arc<dyn Registry>,
    orchestrator: Arc<dyn Orchestrator>,
    cache: Arc<dyn AddressCache>,
    namespace: String,
}

impl Reconciler {
    pub fn new(
        registry: Arc<dyn Registry>,
        orchestrator: Arc<dyn Orchestrator>,
        cache: Arc<dyn AddressCache>,
        namespace: &str,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            cache,
            namespace: namespace.to_string(),
        }
    }

    /// Reconcile loop. First pass runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(namespace = %self.namespace, "reconciler starting");
        if let Err(err) = self.reconcile().await {
            error!(error = %err, "reconcile pass failed");
        }
        loop {
            tokio::select! {
                _ = tokio::time::sleep(RECONCILE_INTERVAL) => {
                    if let Err(err) = self.reconcile().await {
                        error!(error = %err, "reconcile pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("reconciler shutting down");
                    return;
                }
            }
        }
    }

    /// One pass: demote Running records whose pods no longer exist.
    pub async fn reconcile(&self) -> Result<()> {
        let running = self.registry.list_by_status(TenantStatus::Running).await?;
        if running.is_empty() {
            return Ok(());
        }
        debug!(count = running.len(), "checking running tenants");

        for tenant in running {
            let pod_name = names::pod_name(&tenant.tenant_id);
            let exists = match self.orchestrator.pod_exists(&pod_name, &self.namespace).await {
                Ok(exists) => exists,
                Err(err) => {
                    error!(tenant = %tenant.tenant_id, pod = %pod_name, error = %err,
                        "pod existence check failed");
                    continue;
                }
            };
            if exists {
                continue;
            }

            warn!(tenant = %tenant.tenant_id, pod = %pod_name, "pod missing, demoting to idle");
            if let Err(err) = self
                .registry
                .update_status(&tenant.tenant_id, TenantStatus::Idle, "", "")
                .await
            {
                error!(tenant = %tenant.tenant_id, error = %err, "status demotion failed");
                continue;
            }
            if let Err(err) = self.cache.invalidate(&tenant.tenant_id).await {
                error!(tenant = %tenant.tenant_id, error = %err, "cache invalidation failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_kube::FakeOrchestrator;
    use burrow_lock::MemoryCache;
    use burrow_registry::{MemoryRegistry, TenantRecord};

    async fn running_record(registry: &MemoryRegistry, id: &str) {
        let mut rec = TenantRecord::new(id, TenantStatus::Running, "tenants", "tok", 300);
        rec.pod_name = names::pod_name(id);
        rec.pod_address = "10.0.0.5".into();
        registry.create(&rec).await.unwrap();
    }

    fn reconciler(
        registry: Arc<MemoryRegistry>,
        orch: Arc<FakeOrchestrator>,
        cache: Arc<MemoryCache>,
    ) -> Reconciler {
        Reconciler::new(registry, orch, cache, "tenants")
    }

    #[tokio::test]
    async fn demotes_record_with_vanished_pod_and_clears_cache() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        let cache = Arc::new(MemoryCache::new());
        running_record(&registry, "alice").await;
        cache.put("alice", "10.0.0.5", Duration::from_secs(300)).await.unwrap();

        reconciler(registry.clone(), orch, cache.clone()).reconcile().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Idle);
        assert!(rec.pod_name.is_empty() && rec.pod_address.is_empty());
        assert_eq!(cache.get("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn leaves_healthy_running_tenants_alone() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        let cache = Arc::new(MemoryCache::new());
        running_record(&registry, "alice").await;
        orch.create_tenant_pod("alice", "tenants", "pvc-tenant-alice", "tok", None)
            .await
            .unwrap();

        reconciler(registry.clone(), orch, cache).reconcile().await.unwrap();

        let rec = registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert_eq!(rec.pod_address, "10.0.0.5");
    }

    #[tokio::test]
    async fn ignores_non_running_records() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        let cache = Arc::new(MemoryCache::new());
        registry
            .create(&TenantRecord::new("idle-one", TenantStatus::Idle, "tenants", "tok", 300))
            .await
            .unwrap();
        registry
            .create(&TenantRecord::new(
                "provisioning-one",
                TenantStatus::Provisioning,
                "tenants",
                "tok",
                300,
            ))
            .await
            .unwrap();

        reconciler(registry.clone(), orch, cache).reconcile().await.unwrap();

        assert_eq!(
            registry.get("idle-one").await.unwrap().unwrap().status,
            TenantStatus::Idle
        );
        assert_eq!(
            registry.get("provisioning-one").await.unwrap().unwrap().status,
            TenantStatus::Provisioning
        );
    }

    #[tokio::test]
    async fn second_pass_is_a_no_op() {
        let registry = Arc::new(MemoryRegistry::new());
        let orch = Arc::new(FakeOrchestrator::new());
        let cache = Arc::new(MemoryCache::new());
        running_record(&registry, "alice").await;
        running_record(&registry, "bob").await;

        let rec = reconciler(registry.clone(), orch, cache);
        rec.reconcile().await.unwrap();
        let after_first = registry.list_all().await.unwrap();

        rec.reconcile().await.unwrap();
        let after_second = registry.list_all().await.unwrap();

        let mut first: Vec<_> = after_first
            .iter()
            .map(|r| (r.tenant_id.clone(), r.status.as_str()))
            .collect();
        let mut second: Vec<_> = after_second
            .iter()
            .map(|r| (r.tenant_id.clone(), r.status.as_str()))
            .collect();
        first.sort();
        second.sort();
        assert_eq!(first, second);
        assert!(second.iter().all(|(_, s)| *s == "idle"));
    }
}
