//! In-memory orchestrator fake.
//!
//! Models just enough of the platform for the wake pipeline, idle
//! controller, reconciler, and warm-pool tests: named pods with readiness
//! delays, volume bindings, a claimable warm pool, and per-tenant creation
//! counters so tests can assert the exactly-one-creation guarantee.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use burrow_core::{names, Error, Result};

use crate::{Orchestrator, WarmPod};

#[derive(Debug, Clone)]
struct FakePod {
    tenant_id: String,
    node_name: Option<String>,
    address: String,
}

#[derive(Default)]
struct FakeState {
    /// (namespace, pod name) → pod.
    pods: HashMap<(String, String), FakePod>,
    /// (namespace, tenant) volume bindings.
    volumes: HashSet<(String, String)>,
    /// Unclaimed warm pods per namespace, in claim order.
    warm: HashMap<String, Vec<WarmPod>>,
    /// Warm replica target per namespace, as last ensured.
    warm_target: HashMap<String, i32>,
    /// Monotonic counter for synthesized warm replacements.
    warm_seq: u32,
    /// Actual pod creations per tenant (idempotent re-attach not counted).
    creations: HashMap<String, u32>,
    /// Address handed out on readiness, per tenant.
    ready_addresses: HashMap<String, String>,
    /// Tenants whose pods never become ready.
    never_ready: HashSet<String>,
    /// Pod names whose deletion fails with `Unavailable`.
    failing_deletes: HashSet<String>,
    /// Synthesized address counter.
    addr_seq: u8,
}

/// Scriptable in-memory `Orchestrator`.
#[derive(Default)]
pub struct FakeOrchestrator {
    state: Mutex<FakeState>,
    ready_delay: Duration,
}

impl FakeOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay readiness by `delay` on every `wait_pod_ready` call.
    pub fn with_ready_delay(delay: Duration) -> Self {
        Self {
            state: Mutex::default(),
            ready_delay: delay,
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake orchestrator lock poisoned")
    }

    /// Fix the address a tenant's pod reports when ready.
    pub fn set_ready_address(&self, tenant_id: &str, address: &str) {
        self.locked()
            .ready_addresses
            .insert(tenant_id.to_string(), address.to_string());
    }

    /// Make a tenant's pod never report ready.
    pub fn set_never_ready(&self, tenant_id: &str) {
        self.locked().never_ready.insert(tenant_id.to_string());
    }

    /// Seed one unclaimed warm pod.
    pub fn seed_warm_pod(&self, namespace: &str, name: &str, node_name: &str, address: &str) {
        self.locked().warm.entry(namespace.to_string()).or_default().push(WarmPod {
            name: name.to_string(),
            node_name: node_name.to_string(),
            address: address.to_string(),
        });
    }

    /// Number of unclaimed warm pods in a namespace.
    pub fn warm_count(&self, namespace: &str) -> usize {
        self.locked().warm.get(namespace).map_or(0, Vec::len)
    }

    /// How many times a pod was actually created for this tenant.
    pub fn creations(&self, tenant_id: &str) -> u32 {
        self.locked().creations.get(tenant_id).copied().unwrap_or(0)
    }

    /// Node the tenant's pod was pinned to at creation, if any.
    pub fn node_hint(&self, tenant_id: &str, namespace: &str) -> Option<String> {
        let key = (namespace.to_string(), names::pod_name(tenant_id));
        self.locked().pods.get(&key).and_then(|p| p.node_name.clone())
    }

    /// Whether a volume binding exists for this tenant.
    pub fn has_volume(&self, tenant_id: &str, namespace: &str) -> bool {
        self.locked()
            .volumes
            .contains(&(namespace.to_string(), tenant_id.to_string()))
    }

    /// Names of live pods belonging to a tenant.
    pub fn pods_for_tenant(&self, tenant_id: &str, namespace: &str) -> Vec<String> {
        self.locked()
            .pods
            .iter()
            .filter(|((ns, _), pod)| ns == namespace && pod.tenant_id == tenant_id)
            .map(|((_, name), _)| name.clone())
            .collect()
    }

    /// Drop a pod behind the controller's back (simulates node loss).
    pub fn vanish_pod(&self, name: &str, namespace: &str) {
        self.locked().pods.remove(&(namespace.to_string(), name.to_string()));
    }

    /// Make deletions of this pod fail with `Unavailable`.
    pub fn set_delete_failure(&self, name: &str) {
        self.locked().failing_deletes.insert(name.to_string());
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    async fn create_volume(&self, tenant_id: &str, namespace: &str) -> Result<()> {
        self.locked()
            .volumes
            .insert((namespace.to_string(), tenant_id.to_string()));
        Ok(())
    }

    async fn create_tenant_pod(
        &self,
        tenant_id: &str,
        namespace: &str,
        _volume_ref: &str,
        _secret_token: &str,
        node_hint: Option<&str>,
    ) -> Result<String> {
        let pod_name = names::pod_name(tenant_id);
        let key = (namespace.to_string(), pod_name.clone());
        let mut state = self.locked();
        if state.pods.contains_key(&key) {
            // Idempotent by name: attach to the existing pod.
            return Ok(pod_name);
        }
        state.addr_seq += 1;
        let address = state
            .ready_addresses
            .get(tenant_id)
            .cloned()
            .unwrap_or_else(|| format!("10.244.0.{}", state.addr_seq));
        state.pods.insert(
            key,
            FakePod {
                tenant_id: tenant_id.to_string(),
                node_name: node_hint.map(String::from),
                address,
            },
        );
        *state.creations.entry(tenant_id.to_string()).or_default() += 1;
        Ok(pod_name)
    }

    async fn wait_pod_ready(
        &self,
        tenant_id: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<String> {
        if !self.ready_delay.is_zero() {
            tokio::time::sleep(self.ready_delay.min(timeout)).await;
        }
        let state = self.locked();
        let timed_out = state.never_ready.contains(tenant_id) || self.ready_delay > timeout;
        if timed_out {
            return Err(Error::Timeout(format!(
                "pod {} not ready after {}s",
                names::pod_name(tenant_id),
                timeout.as_secs()
            )));
        }
        let key = (namespace.to_string(), names::pod_name(tenant_id));
        match state.pods.get(&key) {
            Some(pod) => Ok(pod.address.clone()),
            None => Err(Error::Timeout(format!(
                "pod {} not ready after {}s",
                names::pod_name(tenant_id),
                timeout.as_secs()
            ))),
        }
    }

    async fn delete_pod(&self, name: &str, namespace: &str, _grace_seconds: i64) -> Result<()> {
        let mut state = self.locked();
        if state.failing_deletes.contains(name) {
            return Err(Error::Unavailable(format!("delete {name}: injected failure")));
        }
        state.pods.remove(&(namespace.to_string(), name.to_string()));
        if let Some(pool) = state.warm.get_mut(namespace) {
            pool.retain(|p| p.name != name);
        }
        Ok(())
    }

    async fn delete_volume(&self, tenant_id: &str, namespace: &str) -> Result<()> {
        self.locked()
            .volumes
            .remove(&(namespace.to_string(), tenant_id.to_string()));
        Ok(())
    }

    async fn pod_exists(&self, name: &str, namespace: &str) -> Result<bool> {
        Ok(self
            .locked()
            .pods
            .contains_key(&(namespace.to_string(), name.to_string())))
    }

    async fn ensure_warm_pool(&self, namespace: &str, replicas: i32) -> Result<()> {
        let mut state = self.locked();
        state.warm_target.insert(namespace.to_string(), replicas);
        // Model the replication controller: top the pool back up to target.
        let mut seq = state.warm_seq;
        let pool = state.warm.entry(namespace.to_string()).or_default();
        while (pool.len() as i32) < replicas {
            seq += 1;
            pool.push(WarmPod {
                name: format!("warm-pool-{seq}"),
                node_name: format!("node-{seq}"),
                address: format!("10.244.9.{seq}"),
            });
        }
        while (pool.len() as i32) > replicas {
            pool.pop();
        }
        state.warm_seq = seq;
        Ok(())
    }

    async fn claim_warm_pod(&self, namespace: &str) -> Result<Option<WarmPod>> {
        let mut state = self.locked();
        let claimed = state
            .warm
            .get_mut(namespace)
            .and_then(|pool| (!pool.is_empty()).then(|| pool.remove(0)));
        if let Some(pod) = &claimed {
            // The claimed pod still runs until the wake pipeline deletes it.
            state.pods.insert(
                (namespace.to_string(), pod.name.clone()),
                FakePod {
                    tenant_id: String::new(),
                    node_name: Some(pod.node_name.clone()),
                    address: pod.address.clone(),
                },
            );
        }
        Ok(claimed)
    }
}
