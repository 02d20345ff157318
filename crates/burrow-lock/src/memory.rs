//! In-memory lock and cache for tests and local mode.
//!
//! TTL expiry is honored so lock-expiry and cache-expiry paths behave as
//! they do against the real service.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use burrow_core::{Error, Result};

use crate::{AddressCache, WakeLock};

/// Mutex-guarded wake lock with expiry.
#[derive(Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, Instant>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WakeLock for MemoryLock {
    async fn acquire(&self, tenant_id: &str, ttl: Duration) -> Result<bool> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::Internal("lock poisoned".into()))?;
        let now = Instant::now();
        if let Some(expires) = held.get(tenant_id) {
            if *expires > now {
                return Ok(false);
            }
        }
        held.insert(tenant_id.to_string(), now + ttl);
        Ok(true)
    }

    async fn release(&self, tenant_id: &str) -> Result<()> {
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::Internal("lock poisoned".into()))?;
        held.remove(tenant_id);
        Ok(())
    }
}

/// Mutex-guarded address cache with expiry.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AddressCache for MemoryCache {
    async fn get(&self, tenant_id: &str) -> Result<Option<String>> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("cache poisoned".into()))?;
        match entries.get(tenant_id) {
            Some((addr, expires)) if *expires > Instant::now() => Ok(Some(addr.clone())),
            Some(_) => {
                entries.remove(tenant_id);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, tenant_id: &str, address: &str, ttl: Duration) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("cache poisoned".into()))?;
        entries.insert(
            tenant_id.to_string(),
            (address.to_string(), Instant::now() + ttl),
        );
        Ok(())
    }

    async fn invalidate(&self, tenant_id: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| Error::Internal("cache poisoned".into()))?;
        entries.remove(tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let lock = MemoryLock::new();
        assert!(lock.acquire("alice", Duration::from_secs(60)).await.unwrap());
        assert!(!lock.acquire("alice", Duration::from_secs(60)).await.unwrap());

        lock.release("alice").await.unwrap();
        assert!(lock.acquire("alice", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn lock_expires_after_ttl() {
        let lock = MemoryLock::new();
        assert!(lock.acquire("alice", Duration::from_millis(10)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(lock.acquire("alice", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn locks_are_per_tenant() {
        let lock = MemoryLock::new();
        assert!(lock.acquire("alice", Duration::from_secs(60)).await.unwrap());
        assert!(lock.acquire("bob", Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let lock = MemoryLock::new();
        lock.release("never-held").await.unwrap();
        lock.release("never-held").await.unwrap();
    }

    #[tokio::test]
    async fn cache_round_trip_and_invalidate() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("alice").await.unwrap(), None);

        cache.put("alice", "10.0.0.5", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("alice").await.unwrap().as_deref(), Some("10.0.0.5"));

        cache.invalidate("alice").await.unwrap();
        assert_eq!(cache.get("alice").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_entries_expire() {
        let cache = MemoryCache::new();
        cache.put("alice", "10.0.0.5", Duration::from_millis(10)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("alice").await.unwrap(), None);
    }
}
