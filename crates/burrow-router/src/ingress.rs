//! Ingress handlers and the async dispatch path.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info, warn};

use burrow_core::Result;
use burrow_lock::ADDRESS_CACHE_TTL;
use burrow_messenger::{extract_chat_id, extract_message_text};

use crate::RouterState;

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// POST /inbound/{tenant_id}
///
/// Acknowledges with 200 before any backend work; the rest happens in a
/// detached task bounded by the dispatch budget.
pub async fn inbound(
    State(state): State<RouterState>,
    Path(tenant_id): Path<String>,
    body: Bytes,
) -> StatusCode {
    if tenant_id.is_empty() {
        return StatusCode::BAD_REQUEST;
    }
    let budget = state.dispatch_budget();
    tokio::spawn(async move {
        if tokio::time::timeout(budget, dispatch(&state, &tenant_id, &body))
            .await
            .is_err()
        {
            error!(tenant = %tenant_id, "inbound dispatch exceeded its budget");
        }
    });
    StatusCode::OK
}

/// The asynchronous half of event handling.
async fn dispatch(state: &RouterState, tenant_id: &str, body: &[u8]) {
    // Cached address → the pod is (probably) up; forward directly.
    if let Ok(Some(address)) = state.cache.get(tenant_id).await {
        match forward_to_pod(state, &address, tenant_id, body).await {
            Ok(reply) => {
                deliver_reply(state, tenant_id, body, reply).await;
                let _ = state.orchestrator.touch_activity(tenant_id).await;
            }
            Err(err) => {
                // Stale entry; the next event re-wakes.
                warn!(tenant = %tenant_id, error = %err, "forward failed, invalidating cache");
                let _ = state.cache.invalidate(tenant_id).await;
            }
        }
        return;
    }

    // Cache miss: the pod may be cold. Tell the user before the long wait.
    let token = state.orchestrator.secret_token(tenant_id).await;
    let chat_id = extract_chat_id(body);
    if chat_id != 0 && !token.is_empty() {
        let _ = state
            .messenger
            .send_message(&token, chat_id, "Starting up, please wait a moment...")
            .await;
    }

    let address = match state.orchestrator.wake(tenant_id).await {
        Ok(address) => address,
        Err(err) => {
            error!(tenant = %tenant_id, error = %err, "wake failed");
            if chat_id != 0 && !token.is_empty() {
                let _ = state
                    .messenger
                    .send_message(&token, chat_id, "Failed to start. Please try again.")
                    .await;
            }
            return;
        }
    };
    if let Err(err) = state.cache.put(tenant_id, &address, ADDRESS_CACHE_TTL).await {
        warn!(tenant = %tenant_id, error = %err, "address cache write failed");
    }

    match forward_to_pod(state, &address, tenant_id, body).await {
        Ok(reply) => {
            deliver_reply(state, tenant_id, body, reply).await;
            let _ = state.orchestrator.touch_activity(tenant_id).await;
        }
        Err(err) => {
            warn!(tenant = %tenant_id, error = %err, "forward failed, invalidating cache");
            let _ = state.cache.invalidate(tenant_id).await;
        }
    }
}

#[derive(Debug, Deserialize)]
struct AgentReply {
    #[serde(default)]
    response: String,
}

/// Forward the event text to the agent pod's webhook endpoint.
///
/// Events with no extractable text are dropped without an error. A reply is
/// returned when the agent produced one.
async fn forward_to_pod(
    state: &RouterState,
    address: &str,
    tenant_id: &str,
    body: &[u8],
) -> Result<Option<String>> {
    let text = extract_message_text(body);
    if text.is_empty() {
        info!(tenant = %tenant_id, "no text in event, skipping forward");
        return Ok(None);
    }

    let url = format!("http://{}:{}/webhook", address, state.agent_port);
    let resp = state
        .http
        .post(&url)
        .json(&serde_json::json!({ "message": text }))
        .send()
        .await
        .map_err(|e| burrow_core::Error::Unavailable(format!("forward to pod: {e}")))?;

    info!(tenant = %tenant_id, pod_address = %address, status = %resp.status(), "forwarded to pod");
    let reply: AgentReply = resp.json().await.unwrap_or(AgentReply {
        response: String::new(),
    });
    Ok((!reply.response.is_empty()).then_some(reply.response))
}

/// Send the agent's reply back through the messaging platform.
async fn deliver_reply(state: &RouterState, tenant_id: &str, body: &[u8], reply: Option<String>) {
    let Some(reply) = reply else { return };
    let chat_id = extract_chat_id(body);
    if chat_id == 0 {
        return;
    }
    let token = state.orchestrator.secret_token(tenant_id).await;
    if token.is_empty() {
        return;
    }
    if let Err(err) = state.messenger.send_message(&token, chat_id, &reply).await {
        warn!(tenant = %tenant_id, error = %err, "reply delivery failed");
    }
}

/// POST /admin/webhook/{tenant_id}
///
/// Re-registers the platform webhook for a tenant, pointing it back at this
/// router's inbound endpoint.
pub async fn register_webhook(
    State(state): State<RouterState>,
    Path(tenant_id): Path<String>,
) -> Response {
    let token = state.orchestrator.secret_token(&tenant_id).await;
    if token.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "tenant not found or no secret token" })),
        )
            .into_response();
    }
    match state.messenger.register_webhook(&token, &tenant_id).await {
        Ok(()) => Json(serde_json::json!({ "ok": true })).into_response(),
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": err.to_string() })),
        )
            .into_response(),
    }
}
