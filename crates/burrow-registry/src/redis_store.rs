//! Redis-backed registry.
//!
//! Records are stored as JSON strings under `{table}:tenant:{id}`.
//! Conditional create uses `SET NX`; field updates run as Lua scripts so the
//! existence check and the merge are one atomic round trip. Scans walk the
//! tenant key prefix only, which keeps synthetic keys (locks, meta entries,
//! cache) out of list output by construction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tracing::warn;

use burrow_core::{Error, Result};

use crate::{Registry, TenantRecord, TenantStatus};

/// Atomically merge status, pod identity, and activity into a stored record.
const UPDATE_STATUS_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local rec = cjson.decode(raw)
rec.status = ARGV[1]
rec.pod_name = ARGV[2]
rec.pod_address = ARGV[3]
rec.last_active_at = ARGV[4]
redis.call('SET', KEYS[1], cjson.encode(rec))
return 1
"#;

/// Atomically set one string field if the record exists.
const UPDATE_FIELD_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local rec = cjson.decode(raw)
rec[ARGV[1]] = ARGV[2]
redis.call('SET', KEYS[1], cjson.encode(rec))
return 1
"#;

/// Atomically set the idle budget if the record exists.
const UPDATE_BUDGET_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return 0 end
local rec = cjson.decode(raw)
rec.idle_budget_seconds = tonumber(ARGV[1])
redis.call('SET', KEYS[1], cjson.encode(rec))
return 1
"#;

/// Registry over a shared Redis service.
#[derive(Clone)]
pub struct RedisRegistry {
    conn: ConnectionManager,
    table: String,
}

impl RedisRegistry {
    /// Connect to the registry store.
    pub async fn connect(addr: &str, table: &str) -> Result<Self> {
        let client = redis::Client::open(addr).map_err(store_err)?;
        let conn = ConnectionManager::new(client).await.map_err(store_err)?;
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }

    fn key(&self, tenant_id: &str) -> String {
        record_key(&self.table, tenant_id)
    }

    fn scan_pattern(&self) -> String {
        format!("{}:tenant:*", self.table)
    }

    async fn scan_records(&self) -> Result<Vec<TenantRecord>> {
        let mut conn = self.conn.clone();
        let mut keys: Vec<String> = Vec::new();
        {
            let mut iter = conn
                .scan_match::<_, String>(self.scan_pattern())
                .await
                .map_err(store_err)?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        let mut records = Vec::with_capacity(raws.len());
        for (key, raw) in keys.iter().zip(raws) {
            let Some(raw) = raw else { continue };
            match serde_json::from_str::<TenantRecord>(&raw) {
                Ok(rec) => records.push(rec),
                // A record that no longer parses is skipped, not fatal.
                Err(err) => warn!(%key, error = %err, "skipping unreadable tenant record"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl Registry for RedisRegistry {
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantRecord>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.key(tenant_id)).await.map_err(store_err)?;
        match raw {
            Some(raw) => {
                let rec = serde_json::from_str(&raw)
                    .map_err(|e| Error::Internal(format!("decode tenant {tenant_id}: {e}")))?;
                Ok(Some(rec))
            }
            None => Ok(None),
        }
    }

    async fn create(&self, record: &TenantRecord) -> Result<()> {
        let json = serde_json::to_string(record)
            .map_err(|e| Error::Internal(format!("encode tenant: {e}")))?;
        let mut conn = self.conn.clone();
        let created: Option<String> = redis::cmd("SET")
            .arg(self.key(&record.tenant_id))
            .arg(json)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        if created.is_none() {
            return Err(Error::AlreadyExists(record.tenant_id.clone()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
        pod_name: &str,
        pod_address: &str,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let _updated: i64 = Script::new(UPDATE_STATUS_LUA)
            .key(self.key(tenant_id))
            .arg(status.as_str())
            .arg(pod_name)
            .arg(pod_address)
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn touch_activity(&self, tenant_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _updated: i64 = Script::new(UPDATE_FIELD_LUA)
            .key(self.key(tenant_id))
            .arg("last_active_at")
            .arg(Utc::now().to_rfc3339())
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn update_token(&self, tenant_id: &str, token: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let updated: i64 = Script::new(UPDATE_FIELD_LUA)
            .key(self.key(tenant_id))
            .arg("secret_token")
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        if updated == 0 {
            return Err(Error::NotFound(tenant_id.to_string()));
        }
        Ok(())
    }

    async fn update_budget(&self, tenant_id: &str, seconds: i64) -> Result<()> {
        let mut conn = self.conn.clone();
        let updated: i64 = Script::new(UPDATE_BUDGET_LUA)
            .key(self.key(tenant_id))
            .arg(seconds)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;
        if updated == 0 {
            return Err(Error::NotFound(tenant_id.to_string()));
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<TenantRecord>> {
        self.scan_records().await
    }

    async fn list_by_status(&self, status: TenantStatus) -> Result<Vec<TenantRecord>> {
        let records = self.scan_records().await?;
        Ok(records.into_iter().filter(|r| r.status == status).collect())
    }

    async fn list_possibly_idle(&self, threshold: Duration) -> Result<Vec<TenantRecord>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::seconds(300));
        let records = self.scan_records().await?;
        Ok(records
            .into_iter()
            .filter(|r| r.status == TenantStatus::Running && r.last_active_at < cutoff)
            .collect())
    }

    async fn delete(&self, tenant_id: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(tenant_id)).await.map_err(store_err)?;
        Ok(())
    }
}

fn record_key(table: &str, tenant_id: &str) -> String {
    format!("{table}:tenant:{tenant_id}")
}

fn store_err(err: redis::RedisError) -> Error {
    Error::Unavailable(format!("registry store: {err}"))
}
