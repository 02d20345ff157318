//! Redis implementations of the wake lock and address cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use burrow_core::{Error, Result};

use crate::{AddressCache, WakeLock, CACHE_KEY_PREFIX, LOCK_KEY_PREFIX};

/// Wake lock over `SET NX PX`.
#[derive(Clone)]
pub struct RedisLock {
    conn: ConnectionManager,
}

impl RedisLock {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the lock service.
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self::new(manager(addr).await?))
    }
}

#[async_trait]
impl WakeLock for RedisLock {
    async fn acquire(&self, tenant_id: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let acquired: Option<String> = redis::cmd("SET")
            .arg(format!("{LOCK_KEY_PREFIX}{tenant_id}"))
            .arg("1")
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(acquired.is_some())
    }

    async fn release(&self, tenant_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(format!("{LOCK_KEY_PREFIX}{tenant_id}"))
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

/// Address cache over `SET EX` / `GET` / `DEL`.
#[derive(Clone)]
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the cache service.
    pub async fn connect(addr: &str) -> Result<Self> {
        Ok(Self::new(manager(addr).await?))
    }
}

#[async_trait]
impl AddressCache for RedisCache {
    async fn get(&self, tenant_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        conn.get(format!("{CACHE_KEY_PREFIX}{tenant_id}"))
            .await
            .map_err(store_err)
    }

    async fn put(&self, tenant_id: &str, address: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(
                format!("{CACHE_KEY_PREFIX}{tenant_id}"),
                address,
                ttl.as_secs(),
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn invalidate(&self, tenant_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(format!("{CACHE_KEY_PREFIX}{tenant_id}"))
            .await
            .map_err(store_err)?;
        Ok(())
    }
}

/// Shared connection constructor for the lock service.
pub async fn manager(addr: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(addr).map_err(store_err)?;
    ConnectionManager::new(client).await.map_err(store_err)
}

fn store_err(err: redis::RedisError) -> Error {
    Error::Unavailable(format!("lock service: {err}"))
}
