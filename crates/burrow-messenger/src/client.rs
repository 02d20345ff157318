//! HTTP client for the bot API.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use burrow_core::{Error, Result};

use crate::Messenger;

/// Default bot API base. Overridable so tests can point at a local stub.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: String,
}

/// `Messenger` over the platform's bot HTTP API.
pub struct BotApiMessenger {
    http: reqwest::Client,
    api_base: String,
    /// Public router URL webhooks point back at.
    public_base: String,
}

impl BotApiMessenger {
    /// Build a client registering webhooks under `public_base`.
    pub fn new(public_base: &str, api_base: Option<&str>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Internal(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            api_base: api_base.unwrap_or(DEFAULT_API_BASE).trim_end_matches('/').to_string(),
            public_base: public_base.trim_end_matches('/').to_string(),
        })
    }

    async fn call(&self, token: &str, method: &str, payload: serde_json::Value) -> Result<()> {
        let url = format!("{}/bot{}/{}", self.api_base, token, method);
        let resp = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("messaging platform: {e}")))?;
        let body: ApiResponse = resp
            .json()
            .await
            .map_err(|e| Error::Unavailable(format!("messaging platform response: {e}")))?;
        if !body.ok {
            return Err(Error::Unavailable(format!(
                "messaging platform rejected {method}: {}",
                body.description
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Messenger for BotApiMessenger {
    async fn register_webhook(&self, token: &str, tenant_id: &str) -> Result<()> {
        let webhook_url = format!("{}/inbound/{}", self.public_base, tenant_id);
        self.call(
            token,
            "setWebhook",
            serde_json::json!({ "url": webhook_url, "drop_pending_updates": true }),
        )
        .await?;
        info!(tenant = %tenant_id, url = %webhook_url, "webhook registered");
        Ok(())
    }

    async fn delete_webhook(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Ok(());
        }
        self.call(
            token,
            "deleteWebhook",
            serde_json::json!({ "drop_pending_updates": false }),
        )
        .await
    }

    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> Result<()> {
        self.call(
            token,
            "sendMessage",
            serde_json::json!({ "chat_id": chat_id, "text": text }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes() {
        let m = BotApiMessenger::new("https://router.example.com/", Some("http://stub:9999/"))
            .unwrap();
        assert_eq!(m.public_base, "https://router.example.com");
        assert_eq!(m.api_base, "http://stub:9999");
    }

    #[test]
    fn default_api_base_applies() {
        let m = BotApiMessenger::new("https://router.example.com", None).unwrap();
        assert_eq!(m.api_base, DEFAULT_API_BASE);
    }
}
