//! burrow-messenger — the external messaging platform.
//!
//! Tenants talk to their agents through a bot-API-shaped messaging service:
//! each tenant owns a secret bot token, the platform pushes updates to a
//! per-tenant webhook on the router, and replies go back through a
//! `sendMessage` call. Webhook registration is an idempotent external call;
//! re-registering the same URL is harmless.

mod client;
mod update;

use async_trait::async_trait;

use burrow_core::Result;

pub use client::{BotApiMessenger, DEFAULT_API_BASE};
pub use update::{extract_chat_id, extract_message_text};

/// Messaging-platform operations the controller and router depend on.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Point the platform's webhook for this token at
    /// `{public_base}/inbound/{tenant_id}`. Idempotent.
    async fn register_webhook(&self, token: &str, tenant_id: &str) -> Result<()>;

    /// Remove the webhook for this token. No-op for an empty token.
    async fn delete_webhook(&self, token: &str) -> Result<()>;

    /// Send a user-visible text message to a chat.
    async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> Result<()>;
}

/// Test double that records calls instead of performing them.
pub mod recording {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use burrow_core::Result;

    use crate::Messenger;

    /// One recorded call.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Call {
        RegisterWebhook { token: String, tenant_id: String },
        DeleteWebhook { token: String },
        SendMessage { token: String, chat_id: i64, text: String },
    }

    /// `Messenger` that appends every call to a log.
    #[derive(Default)]
    pub struct RecordingMessenger {
        calls: Mutex<Vec<Call>>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("recorder poisoned").clone()
        }

        pub fn webhook_deleted_for(&self, token: &str) -> bool {
            self.calls()
                .iter()
                .any(|c| matches!(c, Call::DeleteWebhook { token: t } if t == token))
        }

        pub fn messages_to(&self, chat_id: i64) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::SendMessage { chat_id: id, text, .. } if id == chat_id => Some(text),
                    _ => None,
                })
                .collect()
        }

        fn push(&self, call: Call) {
            self.calls.lock().expect("recorder poisoned").push(call);
        }
    }

    #[async_trait]
    impl Messenger for RecordingMessenger {
        async fn register_webhook(&self, token: &str, tenant_id: &str) -> Result<()> {
            self.push(Call::RegisterWebhook {
                token: token.to_string(),
                tenant_id: tenant_id.to_string(),
            });
            Ok(())
        }

        async fn delete_webhook(&self, token: &str) -> Result<()> {
            if token.is_empty() {
                return Ok(());
            }
            self.push(Call::DeleteWebhook {
                token: token.to_string(),
            });
            Ok(())
        }

        async fn send_message(&self, token: &str, chat_id: i64, text: &str) -> Result<()> {
            self.push(Call::SendMessage {
                token: token.to_string(),
                chat_id,
                text: text.to_string(),
            });
            Ok(())
        }
    }
}
