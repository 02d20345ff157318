//! burrow-registry — durable tenant records.
//!
//! The registry is the authoritative cross-replica store of tenant state.
//! Every replica reads and writes through it; nothing tenant-scoped is ever
//! held in process memory alone. The contract is a key-value store with
//! conditional writes: create is conditional on absence, field updates are
//! conditional on existence, and status commits are last-writer-wins (the
//! wake lock serializes the window where that matters).

mod memory;
mod record;
mod redis_store;

use std::time::Duration;

use async_trait::async_trait;

use burrow_core::Result;

pub use memory::MemoryRegistry;
pub use record::{TenantRecord, TenantStatus};
pub use redis_store::RedisRegistry;

/// Tenant registry operations.
///
/// `update_status` also stamps `last_active_at`, so committing a wake
/// doubles as an activity refresh.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Point read. `None` when the tenant does not exist.
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantRecord>>;

    /// Create a record; fails with `AlreadyExists` when the id is taken.
    async fn create(&self, record: &TenantRecord) -> Result<()>;

    /// Merge status and pod identity, stamping `last_active_at = now`.
    async fn update_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
        pod_name: &str,
        pod_address: &str,
    ) -> Result<()>;

    /// Set `last_active_at = now`. Silent when the record is missing.
    async fn touch_activity(&self, tenant_id: &str) -> Result<()>;

    /// Replace the secret token; `NotFound` when the record is missing.
    async fn update_token(&self, tenant_id: &str, token: &str) -> Result<()>;

    /// Replace the idle budget; `NotFound` when the record is missing.
    async fn update_budget(&self, tenant_id: &str, seconds: i64) -> Result<()>;

    /// All tenant records, excluding synthetic/meta entries.
    async fn list_all(&self) -> Result<Vec<TenantRecord>>;

    /// All tenant records with the given status.
    async fn list_by_status(&self, status: TenantStatus) -> Result<Vec<TenantRecord>>;

    /// Running tenants whose `last_active_at` is older than `threshold`.
    ///
    /// This is a coarse pre-filter; callers re-check the per-tenant budget.
    async fn list_possibly_idle(&self, threshold: Duration) -> Result<Vec<TenantRecord>>;

    /// Remove a record. Silent when it is already gone.
    async fn delete(&self, tenant_id: &str) -> Result<()>;
}
