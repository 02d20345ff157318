//! The wake pipeline — serialized tenant activation.
//!
//! For any tenant, at most one pipeline instance fleet-wide advances past
//! the warm-pool claim in a lock-TTL window. Everyone else converges on the
//! same address through the fast path or by polling the registry while the
//! winner provisions.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use burrow_core::{names, Error, Result};
use burrow_kube::Orchestrator;
use burrow_lock::WakeLock;
use burrow_registry::{Registry, TenantRecord, TenantStatus};

/// Registry poll cadence for callers that lost the wake lock.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Budgets and placement for the pipeline.
#[derive(Debug, Clone)]
pub struct WakeOptions {
    /// Default namespace for autocreated tenants.
    pub namespace: String,
    /// Exclusive wake window; also the polling deadline for lock losers.
    pub wake_lock_ttl: Duration,
    /// Readiness budget for the tenant pod.
    pub pod_ready_wait: Duration,
    /// Registry poll cadence in polling mode.
    pub poll_interval: Duration,
}

impl WakeOptions {
    pub fn new(namespace: &str, wake_lock_ttl: Duration, pod_ready_wait: Duration) -> Self {
        Self {
            namespace: namespace.to_string(),
            wake_lock_ttl,
            pod_ready_wait,
            poll_interval: POLL_INTERVAL,
        }
    }
}

/// Drives a tenant from cold storage to a running, addressable pod.
pub struct WakePipeline {
    registry: Arc<dyn Registry>,
    lock: Arc<dyn WakeLock>,
    orchestrator: Arc<dyn Orchestrator>,
    opts: WakeOptions,
}

impl WakePipeline {
    pub fn new(
        registry: Arc<dyn Registry>,
        lock: Arc<dyn WakeLock>,
        orchestrator: Arc<dyn Orchestrator>,
        opts: WakeOptions,
    ) -> Self {
        Self {
            registry,
            lock,
            orchestrator,
            opts,
        }
    }

    /// Ensure the tenant has a running pod and return its address.
    pub async fn wake(&self, tenant_id: &str) -> Result<String> {
        // Fast path: someone already finished the work.
        let existing = self.registry.get(tenant_id).await?;
        if let Some(rec) = &existing {
            if rec.status == TenantStatus::Running && !rec.pod_address.is_empty() {
                return Ok(rec.pod_address.clone());
            }
        }

        if !self.lock.acquire(tenant_id, self.opts.wake_lock_ttl).await? {
            // Another replica owns the provisioning window; wait it out.
            return self.poll_until_running(tenant_id).await;
        }

        let outcome = self.provision(tenant_id, existing).await;
        if let Err(err) = self.lock.release(tenant_id).await {
            warn!(tenant = %tenant_id, error = %err, "wake lock release failed; TTL will clear it");
        }
        outcome
    }

    /// Steps 3–8, run strictly under the wake lock.
    async fn provision(
        &self,
        tenant_id: &str,
        existing: Option<TenantRecord>,
    ) -> Result<String> {
        let record = match existing {
            Some(rec) => rec,
            None => {
                // First contact: autocreate with default budget. Losing the
                // create race is fine; the other writer's record wins.
                let rec = TenantRecord::new(
                    tenant_id,
                    TenantStatus::Provisioning,
                    &self.opts.namespace,
                    "",
                    0,
                );
                match self.registry.create(&rec).await {
                    Ok(()) => rec,
                    Err(err) if err.is_already_exists() => {
                        self.registry.get(tenant_id).await?.unwrap_or(rec)
                    }
                    Err(err) => return Err(err),
                }
            }
        };
        let namespace = if record.namespace.is_empty() {
            self.opts.namespace.clone()
        } else {
            record.namespace.clone()
        };

        self.orchestrator.create_volume(tenant_id, &namespace).await?;

        // A warm pod contributes exactly its node: delete it with zero grace
        // to free the slot, then pin the tenant pod there. Claim failures
        // degrade to a cold start.
        let node_hint = match self.orchestrator.claim_warm_pod(&namespace).await {
            Ok(Some(warm)) => {
                info!(tenant = %tenant_id, node = %warm.node_name, warm_pod = %warm.name,
                    "warm pool hit, reusing node");
                if let Err(err) = self.orchestrator.delete_pod(&warm.name, &namespace, 0).await {
                    warn!(tenant = %tenant_id, warm_pod = %warm.name, error = %err,
                        "freeing claimed warm pod failed");
                }
                Some(warm.node_name)
            }
            Ok(None) => {
                info!(tenant = %tenant_id, "warm pool miss, cold start");
                None
            }
            Err(err) => {
                warn!(tenant = %tenant_id, error = %err, "warm pool claim failed, cold start");
                None
            }
        };

        let pod_name = self
            .orchestrator
            .create_tenant_pod(
                tenant_id,
                &namespace,
                &names::pvc_name(tenant_id),
                &record.secret_token,
                node_hint.as_deref(),
            )
            .await?;

        // No rollback on a readiness timeout: the next wake attaches to the
        // half-created pod by name, or the reconciler repairs the registry.
        let address = self
            .orchestrator
            .wait_pod_ready(tenant_id, &namespace, self.opts.pod_ready_wait)
            .await?;

        self.registry
            .update_status(tenant_id, TenantStatus::Running, &pod_name, &address)
            .await?;
        info!(tenant = %tenant_id, pod = %pod_name, address = %address, "wake committed");
        Ok(address)
    }

    /// Wait for whoever holds the lock to commit, re-reading the registry.
    async fn poll_until_running(&self, tenant_id: &str) -> Result<String> {
        debug!(tenant = %tenant_id, "wake lock held elsewhere, polling registry");
        let deadline = tokio::time::Instant::now() + self.opts.wake_lock_ttl;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "tenant {tenant_id} did not become running within the wake budget"
                )));
            }
            tokio::time::sleep(self.opts.poll_interval).await;
            match self.registry.get(tenant_id).await {
                Ok(Some(rec))
                    if rec.status == TenantStatus::Running && !rec.pod_address.is_empty() =>
                {
                    return Ok(rec.pod_address);
                }
                Ok(_) => {}
                // Transient read errors just mean another poll round.
                Err(err) => debug!(tenant = %tenant_id, error = %err, "poll read failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_kube::FakeOrchestrator;
    use burrow_lock::MemoryLock;
    use burrow_registry::MemoryRegistry;

    fn quick_opts() -> WakeOptions {
        WakeOptions {
            namespace: "tenants".into(),
            wake_lock_ttl: Duration::from_secs(2),
            pod_ready_wait: Duration::from_secs(2),
            poll_interval: Duration::from_millis(20),
        }
    }

    struct Fixture {
        registry: Arc<MemoryRegistry>,
        lock: Arc<MemoryLock>,
        orchestrator: Arc<FakeOrchestrator>,
        pipeline: Arc<WakePipeline>,
    }

    fn fixture_with(orchestrator: FakeOrchestrator) -> Fixture {
        let registry = Arc::new(MemoryRegistry::new());
        let lock = Arc::new(MemoryLock::new());
        let orchestrator = Arc::new(orchestrator);
        let pipeline = Arc::new(WakePipeline::new(
            registry.clone(),
            lock.clone(),
            orchestrator.clone(),
            quick_opts(),
        ));
        Fixture {
            registry,
            lock,
            orchestrator,
            pipeline,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(FakeOrchestrator::new())
    }

    #[tokio::test]
    async fn cold_wake_autocreates_and_commits_running() {
        let f = fixture();
        f.orchestrator.set_ready_address("alice", "10.1.0.1");

        let addr = f.pipeline.wake("alice").await.unwrap();
        assert_eq!(addr, "10.1.0.1");

        let rec = f.registry.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert_eq!(rec.pod_name, "burrow-agent-alice");
        assert_eq!(rec.pod_address, "10.1.0.1");
        assert_eq!(rec.idle_budget_seconds, 300);
        assert!(f.orchestrator.has_volume("alice", "tenants"));
    }

    #[tokio::test]
    async fn running_tenant_takes_the_fast_path() {
        let f = fixture();
        f.orchestrator.set_ready_address("alice", "10.0.0.5");
        f.pipeline.wake("alice").await.unwrap();
        let created_before = f.orchestrator.creations("alice");

        let addr = f.pipeline.wake("alice").await.unwrap();
        assert_eq!(addr, "10.0.0.5");
        assert_eq!(f.orchestrator.creations("alice"), created_before);
    }

    #[tokio::test]
    async fn concurrent_wakes_create_at_most_one_pod() {
        let f = fixture_with(FakeOrchestrator::with_ready_delay(Duration::from_millis(200)));
        f.orchestrator.set_ready_address("bob", "10.2.0.1");

        let addresses = futures::future::join_all((0..10).map(|_| {
            let pipeline = f.pipeline.clone();
            async move { pipeline.wake("bob").await }
        }))
        .await;

        for addr in addresses {
            assert_eq!(addr.unwrap(), "10.2.0.1");
        }
        assert_eq!(f.orchestrator.creations("bob"), 1);
        assert_eq!(f.orchestrator.pods_for_tenant("bob", "tenants").len(), 1);
    }

    #[tokio::test]
    async fn warm_claim_pins_node_and_frees_the_warm_pod() {
        let f = fixture();
        f.orchestrator.seed_warm_pod("tenants", "warm-pool-1", "n1", "10.244.9.1");
        f.orchestrator.set_ready_address("carol", "10.3.0.1");

        let addr = f.pipeline.wake("carol").await.unwrap();
        assert_eq!(addr, "10.3.0.1");
        assert_eq!(f.orchestrator.node_hint("carol", "tenants").as_deref(), Some("n1"));
        // The claimed placeholder was deleted to free its slot.
        assert!(!f.orchestrator.pod_exists("warm-pool-1", "tenants").await.unwrap());
        assert_eq!(f.orchestrator.warm_count("tenants"), 0);
    }

    #[tokio::test]
    async fn empty_pool_means_cold_start() {
        let f = fixture();
        f.orchestrator.set_ready_address("dave", "10.4.0.1");

        f.pipeline.wake("dave").await.unwrap();
        assert_eq!(f.orchestrator.node_hint("dave", "tenants"), None);
    }

    #[tokio::test]
    async fn readiness_timeout_keeps_the_pod_for_the_next_wake() {
        let f = fixture();
        f.orchestrator.set_never_ready("erin");

        let err = f.pipeline.wake("erin").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));

        // The half-created pod stays; the registry never reached Running.
        assert!(f.orchestrator.pod_exists("burrow-agent-erin", "tenants").await.unwrap());
        let rec = f.registry.get("erin").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Provisioning);

        // The lock was released, so a later wake may retry immediately and
        // attaches to the existing pod.
        assert!(f.lock.acquire("erin", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn lock_loser_polls_to_the_winners_address() {
        let f = fixture();
        // Hold the lock as if another replica were provisioning.
        assert!(f.lock.acquire("frank", Duration::from_secs(2)).await.unwrap());

        let registry = f.registry.clone();
        let pipeline = f.pipeline.clone();
        let waker = tokio::spawn(async move { pipeline.wake("frank").await });

        // The "other replica" commits shortly after.
        tokio::time::sleep(Duration::from_millis(50)).await;
        registry
            .create(&TenantRecord::new(
                "frank",
                TenantStatus::Provisioning,
                "tenants",
                "",
                0,
            ))
            .await
            .unwrap();
        registry
            .update_status("frank", TenantStatus::Running, "burrow-agent-frank", "10.5.0.1")
            .await
            .unwrap();

        let addr = waker.await.unwrap().unwrap();
        assert_eq!(addr, "10.5.0.1");
        // The polling path never touched the platform.
        assert_eq!(f.orchestrator.creations("frank"), 0);
    }

    #[tokio::test]
    async fn lock_loser_times_out_when_nobody_commits() {
        let f = fixture();
        assert!(f.lock.acquire("gina", Duration::from_secs(60)).await.unwrap());

        let mut opts = quick_opts();
        opts.wake_lock_ttl = Duration::from_millis(100);
        let pipeline = WakePipeline::new(
            f.registry.clone(),
            f.lock.clone(),
            f.orchestrator.clone(),
            opts,
        );

        let err = pipeline.wake("gina").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test]
    async fn existing_idle_record_keeps_its_token_and_budget() {
        let f = fixture();
        f.registry
            .create(&TenantRecord::new("hana", TenantStatus::Idle, "tenants", "tok-hana", 900))
            .await
            .unwrap();
        f.orchestrator.set_ready_address("hana", "10.6.0.1");

        f.pipeline.wake("hana").await.unwrap();

        let rec = f.registry.get("hana").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert_eq!(rec.secret_token, "tok-hana");
        assert_eq!(rec.idle_budget_seconds, 900);
    }
}
