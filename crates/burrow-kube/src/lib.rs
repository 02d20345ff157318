//! burrow-kube — pod and volume operations against the container platform.
//!
//! Every primitive here is idempotent: pod and volume names derive from the
//! tenant id, create tolerates "already exists", delete tolerates "not
//! found". That is what lets the wake pipeline, the idle controller, and the
//! reconciler overlap without coordination beyond the wake lock.

mod client;
mod fake;

use std::time::Duration;

use async_trait::async_trait;

use burrow_core::Result;

pub use client::{ClientConfig, KubeOrchestrator};
pub use fake::FakeOrchestrator;

/// Label value marking an unclaimed warm pod.
pub const WARM_LABEL_READY: &str = "true";
/// Label value a claimer flips to, detaching the pod from its controller.
pub const WARM_LABEL_CONSUMING: &str = "consuming";
/// Name of the warm-pool workload.
pub const WARM_POOL_NAME: &str = "warm-pool";

/// A warm pod claimed out of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmPod {
    pub name: String,
    /// Node the pod is scheduled on; the only thing the wake pipeline
    /// actually consumes.
    pub node_name: String,
    pub address: String,
}

/// Container-platform operations the controller depends on.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Bind durable external storage for a tenant. Idempotent.
    async fn create_volume(&self, tenant_id: &str, namespace: &str) -> Result<()>;

    /// Create the tenant's agent pod, pinned to `node_hint` when given.
    /// Idempotent by derived pod name; returns the pod name.
    async fn create_tenant_pod(
        &self,
        tenant_id: &str,
        namespace: &str,
        volume_ref: &str,
        secret_token: &str,
        node_hint: Option<&str>,
    ) -> Result<String>;

    /// Poll until the tenant pod is Running with a non-empty address, or the
    /// budget elapses (`Timeout`). Returns the pod address.
    async fn wait_pod_ready(
        &self,
        tenant_id: &str,
        namespace: &str,
        timeout: Duration,
    ) -> Result<String>;

    /// Delete a pod with the given grace budget. Absent pods are success.
    async fn delete_pod(&self, name: &str, namespace: &str, grace_seconds: i64) -> Result<()>;

    /// Release a tenant's durable-storage binding. Idempotent.
    async fn delete_volume(&self, tenant_id: &str, namespace: &str) -> Result<()>;

    /// Whether a pod with this name currently exists.
    async fn pod_exists(&self, name: &str, namespace: &str) -> Result<bool>;

    /// Create or update the warm-pool workload to the target replica count
    /// and current agent image. Declarative; safe to call every tick.
    async fn ensure_warm_pool(&self, namespace: &str, replicas: i32) -> Result<()>;

    /// Atomically claim one warm pod via the relabel protocol, or `None`
    /// when the pool is empty. Losing a relabel race skips to the next
    /// candidate, so concurrent claimers get distinct pods.
    async fn claim_warm_pod(&self, namespace: &str) -> Result<Option<WarmPod>>;
}
