//! Tenant record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use burrow_core::names;

/// Lifecycle state of a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// A wake holds the lock and is building the pod.
    Provisioning,
    /// Pod is up and addressable.
    Running,
    /// No pod; the tenant is in cold storage.
    Idle,
    /// Administratively deleted.
    Terminated,
}

impl TenantStatus {
    /// Stable string form, matching the serialized representation.
    pub fn as_str(self) -> &'static str {
        match self {
            TenantStatus::Provisioning => "provisioning",
            TenantStatus::Running => "running",
            TenantStatus::Idle => "idle",
            TenantStatus::Terminated => "terminated",
        }
    }
}

/// Durable tenant record, keyed by `tenant_id`.
///
/// `pod_name` and `pod_address` are non-empty exactly when the tenant is
/// `Running` (or mid-`Provisioning` commit); Idle and Terminated records
/// carry both as empty strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantRecord {
    pub tenant_id: String,
    pub status: TenantStatus,
    #[serde(default)]
    pub pod_name: String,
    #[serde(default)]
    pub pod_address: String,
    pub namespace: String,
    pub storage_prefix: String,
    /// Tenant-owned credential. Redacted from every external read except
    /// the dedicated secret endpoint.
    #[serde(default)]
    pub secret_token: String,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub idle_budget_seconds: i64,
}

impl TenantRecord {
    /// Default idle budget, in seconds, applied when a caller passes zero.
    pub const DEFAULT_IDLE_BUDGET_S: i64 = 300;

    /// Build a fresh record in the given status with a derived storage
    /// prefix and `created_at = last_active_at = now`.
    pub fn new(
        tenant_id: &str,
        status: TenantStatus,
        namespace: &str,
        secret_token: &str,
        idle_budget_seconds: i64,
    ) -> Self {
        let now = Utc::now();
        let budget = if idle_budget_seconds > 0 {
            idle_budget_seconds
        } else {
            Self::DEFAULT_IDLE_BUDGET_S
        };
        Self {
            tenant_id: tenant_id.to_string(),
            status,
            pod_name: String::new(),
            pod_address: String::new(),
            namespace: namespace.to_string(),
            storage_prefix: names::storage_prefix(tenant_id),
            secret_token: secret_token.to_string(),
            created_at: now,
            last_active_at: now,
            idle_budget_seconds: budget,
        }
    }

    /// Effective idle budget, substituting the default for zero.
    pub fn idle_budget(&self) -> std::time::Duration {
        let secs = if self.idle_budget_seconds > 0 {
            self.idle_budget_seconds
        } else {
            Self::DEFAULT_IDLE_BUDGET_S
        };
        std::time::Duration::from_secs(secs as u64)
    }

    /// Copy with the secret token blanked, for external responses.
    pub fn redacted(mut self) -> Self {
        self.secret_token.clear();
        self
    }
}
