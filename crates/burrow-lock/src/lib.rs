//! burrow-lock — cross-replica wake lock and pod address cache.
//!
//! Both live in the shared lock service under distinct key spaces:
//! `tenant:waking:{id}` for the wake lock and `router:endpoint:{id}` for the
//! address cache. The lock is a TTL-guarded test-and-set; the cache is
//! best-effort and self-correcting (a failed forward invalidates it).

mod memory;
mod redis_impl;

use std::time::Duration;

use async_trait::async_trait;

use burrow_core::Result;

pub use memory::{MemoryCache, MemoryLock};
pub use redis_impl::{manager, RedisCache, RedisLock};

/// Default TTL for cached pod addresses.
pub const ADDRESS_CACHE_TTL: Duration = Duration::from_secs(300);

pub(crate) const LOCK_KEY_PREFIX: &str = "tenant:waking:";
pub(crate) const CACHE_KEY_PREFIX: &str = "router:endpoint:";

/// Exclusive, TTL-guarded wake lease per tenant.
///
/// A `true` return from `acquire` grants exclusive wake rights for `ttl`.
/// Callers that lose the race must not create pods; they poll the registry
/// instead.
#[async_trait]
pub trait WakeLock: Send + Sync {
    /// Atomic test-and-set with expiry.
    async fn acquire(&self, tenant_id: &str, ttl: Duration) -> Result<bool>;

    /// Release the lock. Idempotent; releasing an expired or absent lock is
    /// not an error.
    async fn release(&self, tenant_id: &str) -> Result<()>;
}

/// Short-TTL pod address cache shared by router replicas.
///
/// Misses are `Ok(None)`, never errors.
#[async_trait]
pub trait AddressCache: Send + Sync {
    async fn get(&self, tenant_id: &str) -> Result<Option<String>>;

    async fn put(&self, tenant_id: &str, address: &str, ttl: Duration) -> Result<()>;

    /// Drop the entry. Idempotent.
    async fn invalidate(&self, tenant_id: &str) -> Result<()>;
}
