//! HTTP client for the orchestrator's control API.

use std::time::Duration;

use serde::Deserialize;

use burrow_core::{Error, Result};

#[derive(Debug, Deserialize)]
struct WakeResponse {
    pod_address: String,
}

#[derive(Debug, Deserialize)]
struct SecretResponse {
    token: String,
}

/// Client for the wake, secret, and activity endpoints.
pub struct OrchestratorClient {
    http: reqwest::Client,
    base: String,
}

impl OrchestratorClient {
    /// Build a client. The request timeout must outlive a full wake, so it
    /// is derived from the wake budget rather than a fixed constant.
    pub fn new(base: &str, wake_budget: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(wake_budget + Duration::from_secs(60))
            .build()
            .map_err(|e| Error::Internal(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    /// Ensure the tenant is running; returns the pod address.
    pub async fn wake(&self, tenant_id: &str) -> Result<String> {
        let url = format!("{}/wake/{}", self.base, tenant_id);
        let resp = self
            .http
            .post(&url)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("orchestrator wake: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Unavailable(format!("wake status {status}: {body}")));
        }
        let body: WakeResponse = resp
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("decode wake response: {e}")))?;
        Ok(body.pod_address)
    }

    /// Fetch the tenant's secret token; empty when the tenant is unknown.
    pub async fn secret_token(&self, tenant_id: &str) -> String {
        let url = format!("{}/tenants/{}/secret", self.base, tenant_id);
        let Ok(resp) = self.http.get(&url).send().await else {
            return String::new();
        };
        if !resp.status().is_success() {
            return String::new();
        }
        resp.json::<SecretResponse>()
            .await
            .map(|r| r.token)
            .unwrap_or_default()
    }

    /// Refresh the tenant's activity stamp. Best-effort.
    pub async fn touch_activity(&self, tenant_id: &str) -> Result<()> {
        let url = format!("{}/tenants/{}/activity", self.base, tenant_id);
        self.http
            .put(&url)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("orchestrator activity: {e}")))?;
        Ok(())
    }
}
