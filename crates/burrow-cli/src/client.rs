//! HTTP client for the burrow control API.

use anyhow::{bail, Context, Result};
use serde::Serialize;

/// Client for the orchestrator's public endpoints.
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTenant<'a> {
    pub tenant_id: &'a str,
    pub secret_token: &'a str,
    pub idle_budget_seconds: i64,
}

#[derive(Debug, Serialize)]
pub struct PatchTenant<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_budget_seconds: Option<i64>,
}

impl ApiClient {
    pub fn new(base: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(330))
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub async fn create_tenant(&self, req: &CreateTenant<'_>) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(self.url("/tenants"))
            .json(req)
            .send()
            .await
            .context("send request")?;
        json_or_error(resp).await
    }

    pub async fn list_tenants(&self) -> Result<serde_json::Value> {
        let resp = self.http.get(self.url("/tenants")).send().await.context("send request")?;
        json_or_error(resp).await
    }

    pub async fn get_tenant(&self, id: &str) -> Result<serde_json::Value> {
        let resp = self
            .http
            .get(self.url(&format!("/tenants/{id}")))
            .send()
            .await
            .context("send request")?;
        json_or_error(resp).await
    }

    pub async fn update_tenant(&self, id: &str, req: &PatchTenant<'_>) -> Result<serde_json::Value> {
        let resp = self
            .http
            .patch(self.url(&format!("/tenants/{id}")))
            .json(req)
            .send()
            .await
            .context("send request")?;
        json_or_error(resp).await
    }

    pub async fn delete_tenant(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/tenants/{id}")))
            .send()
            .await
            .context("send request")?;
        if !resp.status().is_success() {
            bail!("API error ({})", resp.status());
        }
        Ok(())
    }

    pub async fn touch_activity(&self, id: &str) -> Result<()> {
        let resp = self
            .http
            .put(self.url(&format!("/tenants/{id}/activity")))
            .send()
            .await
            .context("send request")?;
        if !resp.status().is_success() {
            bail!("API error ({})", resp.status());
        }
        Ok(())
    }

    pub async fn wake(&self, id: &str) -> Result<serde_json::Value> {
        let resp = self
            .http
            .post(self.url(&format!("/wake/{id}")))
            .send()
            .await
            .context("send request")?;
        json_or_error(resp).await
    }
}

async fn json_or_error(resp: reqwest::Response) -> Result<serde_json::Value> {
    let status = resp.status();
    if status.is_success() {
        resp.json().await.context("parse response")
    } else {
        let body = resp.text().await.unwrap_or_default();
        bail!("API error ({status}): {body}")
    }
}
