//! In-memory registry for tests and local mode.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use burrow_core::{Error, Result};

use crate::{Registry, TenantRecord, TenantStatus};

/// `HashMap`-backed registry. Same contract as the durable store, minus
/// durability; conditional-write semantics are preserved exactly.
#[derive(Default)]
pub struct MemoryRegistry {
    records: RwLock<HashMap<String, TenantRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err() -> Error {
        Error::Internal("registry lock poisoned".into())
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get(&self, tenant_id: &str) -> Result<Option<TenantRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_err())?;
        Ok(records.get(tenant_id).cloned())
    }

    async fn create(&self, record: &TenantRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        if records.contains_key(&record.tenant_id) {
            return Err(Error::AlreadyExists(record.tenant_id.clone()));
        }
        records.insert(record.tenant_id.clone(), record.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        tenant_id: &str,
        status: TenantStatus,
        pod_name: &str,
        pod_address: &str,
    ) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        if let Some(rec) = records.get_mut(tenant_id) {
            rec.status = status;
            rec.pod_name = pod_name.to_string();
            rec.pod_address = pod_address.to_string();
            rec.last_active_at = Utc::now();
        }
        Ok(())
    }

    async fn touch_activity(&self, tenant_id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        if let Some(rec) = records.get_mut(tenant_id) {
            rec.last_active_at = Utc::now();
        }
        Ok(())
    }

    async fn update_token(&self, tenant_id: &str, token: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        match records.get_mut(tenant_id) {
            Some(rec) => {
                rec.secret_token = token.to_string();
                Ok(())
            }
            None => Err(Error::NotFound(tenant_id.to_string())),
        }
    }

    async fn update_budget(&self, tenant_id: &str, seconds: i64) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        match records.get_mut(tenant_id) {
            Some(rec) => {
                rec.idle_budget_seconds = seconds;
                Ok(())
            }
            None => Err(Error::NotFound(tenant_id.to_string())),
        }
    }

    async fn list_all(&self) -> Result<Vec<TenantRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_err())?;
        Ok(records.values().cloned().collect())
    }

    async fn list_by_status(&self, status: TenantStatus) -> Result<Vec<TenantRecord>> {
        let records = self.records.read().map_err(|_| Self::lock_err())?;
        Ok(records.values().filter(|r| r.status == status).cloned().collect())
    }

    async fn list_possibly_idle(&self, threshold: Duration) -> Result<Vec<TenantRecord>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::seconds(300));
        let records = self.records.read().map_err(|_| Self::lock_err())?;
        Ok(records
            .values()
            .filter(|r| r.status == TenantStatus::Running && r.last_active_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete(&self, tenant_id: &str) -> Result<()> {
        let mut records = self.records.write().map_err(|_| Self::lock_err())?;
        records.remove(tenant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idle_record(id: &str) -> TenantRecord {
        TenantRecord::new(id, TenantStatus::Idle, "tenants", "tok", 300)
    }

    #[tokio::test]
    async fn create_then_get() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("alice")).await.unwrap();

        let rec = reg.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.tenant_id, "alice");
        assert_eq!(rec.status, TenantStatus::Idle);
    }

    #[tokio::test]
    async fn create_duplicate_fails_second_call() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("alice")).await.unwrap();

        let err = reg.create(&idle_record("alice")).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn update_status_sets_pod_fields_and_refreshes_activity() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("alice")).await.unwrap();
        let before = reg.get("alice").await.unwrap().unwrap().last_active_at;

        reg.update_status("alice", TenantStatus::Running, "burrow-agent-alice", "10.0.0.5")
            .await
            .unwrap();

        let rec = reg.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.status, TenantStatus::Running);
        assert_eq!(rec.pod_name, "burrow-agent-alice");
        assert_eq!(rec.pod_address, "10.0.0.5");
        assert!(rec.last_active_at >= before);
    }

    #[tokio::test]
    async fn running_requires_pod_fields_and_idle_clears_them() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("alice")).await.unwrap();

        reg.update_status("alice", TenantStatus::Running, "burrow-agent-alice", "10.0.0.5")
            .await
            .unwrap();
        let rec = reg.get("alice").await.unwrap().unwrap();
        assert!(!rec.pod_name.is_empty() && !rec.pod_address.is_empty());

        reg.update_status("alice", TenantStatus::Idle, "", "").await.unwrap();
        let rec = reg.get("alice").await.unwrap().unwrap();
        assert!(rec.pod_name.is_empty() && rec.pod_address.is_empty());
    }

    #[tokio::test]
    async fn touch_activity_is_silent_on_missing() {
        let reg = MemoryRegistry::new();
        reg.touch_activity("ghost").await.unwrap();
    }

    #[tokio::test]
    async fn token_and_budget_updates_require_existence() {
        let reg = MemoryRegistry::new();
        assert!(reg.update_token("ghost", "t").await.unwrap_err().is_not_found());
        assert!(reg.update_budget("ghost", 60).await.unwrap_err().is_not_found());

        reg.create(&idle_record("alice")).await.unwrap();
        reg.update_token("alice", "new-token").await.unwrap();
        reg.update_budget("alice", 600).await.unwrap();

        let rec = reg.get("alice").await.unwrap().unwrap();
        assert_eq!(rec.secret_token, "new-token");
        assert_eq!(rec.idle_budget_seconds, 600);
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("a")).await.unwrap();
        reg.create(&idle_record("b")).await.unwrap();
        reg.update_status("b", TenantStatus::Running, "burrow-agent-b", "10.0.0.2")
            .await
            .unwrap();

        let running = reg.list_by_status(TenantStatus::Running).await.unwrap();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].tenant_id, "b");
        assert_eq!(reg.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn list_possibly_idle_is_a_coarse_running_filter() {
        let reg = MemoryRegistry::new();
        let mut stale = idle_record("stale");
        stale.status = TenantStatus::Running;
        stale.pod_name = "burrow-agent-stale".into();
        stale.pod_address = "10.0.0.9".into();
        stale.last_active_at = Utc::now() - chrono::Duration::minutes(10);
        reg.create(&stale).await.unwrap();

        let mut fresh = idle_record("fresh");
        fresh.status = TenantStatus::Running;
        fresh.pod_name = "burrow-agent-fresh".into();
        fresh.pod_address = "10.0.0.10".into();
        reg.create(&fresh).await.unwrap();

        let idle = reg.list_possibly_idle(Duration::from_secs(300)).await.unwrap();
        assert_eq!(idle.len(), 1);
        assert_eq!(idle[0].tenant_id, "stale");
    }

    #[tokio::test]
    async fn delete_is_silent_on_missing() {
        let reg = MemoryRegistry::new();
        reg.create(&idle_record("alice")).await.unwrap();
        reg.delete("alice").await.unwrap();
        reg.delete("alice").await.unwrap();
        assert!(reg.get("alice").await.unwrap().is_none());
    }
}
