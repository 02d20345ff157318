//! Control API handlers.
//!
//! Handlers translate the error taxonomy onto status codes and redact
//! secret tokens from every response except the dedicated secret endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use tracing::{error, info, warn};

use burrow_core::{names, Error};
use burrow_registry::{TenantRecord, TenantStatus};

use crate::AppState;

fn error_response(err: &Error) -> Response {
    let status = match err {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::AlreadyExists(_) => StatusCode::CONFLICT,
        Error::BadRequest(_) => StatusCode::BAD_REQUEST,
        Error::Unavailable(_) | Error::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": err.to_string() }))).into_response()
}

/// GET /healthz
pub async fn healthz() -> &'static str {
    "ok"
}

/// POST /tenants request body.
#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub secret_token: String,
    #[serde(default)]
    pub idle_budget_seconds: i64,
}

/// POST /tenants
pub async fn create_tenant(
    State(state): State<AppState>,
    Json(req): Json<CreateTenantRequest>,
) -> Response {
    if req.tenant_id.is_empty() {
        return error_response(&Error::BadRequest("tenant_id required".into()));
    }
    let record = TenantRecord::new(
        &req.tenant_id,
        TenantStatus::Idle,
        &state.namespace,
        &req.secret_token,
        req.idle_budget_seconds,
    );
    if let Err(err) = state.registry.create(&record).await {
        error!(tenant = %req.tenant_id, error = %err, "tenant create failed");
        return error_response(&err);
    }

    // Webhook registration is best-effort; the tenant exists either way and
    // the admin endpoint can re-register later.
    if let Some(messenger) = &state.messenger {
        if !record.secret_token.is_empty() {
            match messenger.register_webhook(&record.secret_token, &record.tenant_id).await {
                Ok(()) => info!(tenant = %record.tenant_id, "webhook registered"),
                Err(err) => warn!(tenant = %record.tenant_id, error = %err,
                    "webhook registration failed, tenant created anyway"),
            }
        }
    }

    (StatusCode::CREATED, Json(record.redacted())).into_response()
}

/// GET /tenants
pub async fn list_tenants(State(state): State<AppState>) -> Response {
    match state.registry.list_all().await {
        Ok(records) => {
            let redacted: Vec<TenantRecord> =
                records.into_iter().map(TenantRecord::redacted).collect();
            Json(redacted).into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// GET /tenants/{id}
pub async fn get_tenant(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Ok(Some(rec)) => Json(rec.redacted()).into_response(),
        Ok(None) => error_response(&Error::NotFound(id)),
        Err(err) => error_response(&err),
    }
}

/// GET /tenants/{id}/secret — internal use by the router.
pub async fn get_secret(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.get(&id).await {
        Ok(Some(rec)) => Json(serde_json::json!({ "token": rec.secret_token })).into_response(),
        Ok(None) => error_response(&Error::NotFound(id)),
        Err(err) => error_response(&err),
    }
}

/// PATCH /tenants/{id} request body.
#[derive(Debug, Deserialize)]
pub struct PatchTenantRequest {
    pub secret_token: Option<String>,
    pub idle_budget_seconds: Option<i64>,
}

/// PATCH /tenants/{id}
pub async fn patch_tenant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<PatchTenantRequest>,
) -> Response {
    if let Some(token) = &req.secret_token {
        if let Err(err) = state.registry.update_token(&id, token).await {
            return error_response(&err);
        }
        if let Some(messenger) = &state.messenger {
            if !token.is_empty() {
                if let Err(err) = messenger.register_webhook(token, &id).await {
                    warn!(tenant = %id, error = %err,
                        "webhook re-registration failed, token updated anyway");
                }
            }
        }
    }
    if let Some(seconds) = req.idle_budget_seconds {
        if let Err(err) = state.registry.update_budget(&id, seconds).await {
            return error_response(&err);
        }
    }
    match state.registry.get(&id).await {
        Ok(Some(rec)) => Json(rec.redacted()).into_response(),
        Ok(None) => error_response(&Error::NotFound(id)),
        Err(err) => error_response(&err),
    }
}

/// DELETE /tenants/{id}
pub async fn delete_tenant(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let record = match state.registry.get(&id).await {
        Ok(Some(rec)) => rec,
        Ok(None) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => return error_response(&err),
    };

    if let Some(orchestrator) = &state.orchestrator {
        if !record.pod_name.is_empty() {
            if let Err(err) = orchestrator
                .delete_pod(&record.pod_name, &record.namespace, state.pod_grace_seconds)
                .await
            {
                error!(tenant = %id, error = %err, "pod delete failed during tenant delete");
            }
        }
        if let Err(err) = orchestrator.delete_volume(&id, &record.namespace).await {
            error!(tenant = %id, error = %err, "volume delete failed during tenant delete");
        }
    }
    if let Err(err) = state.registry.delete(&id).await {
        return error_response(&err);
    }
    if let Err(err) = state.cache.invalidate(&id).await {
        warn!(tenant = %id, error = %err, "address cache clear failed during tenant delete");
    }
    if let Some(messenger) = &state.messenger {
        if let Err(err) = messenger.delete_webhook(&record.secret_token).await {
            warn!(tenant = %id, error = %err, "webhook removal failed during tenant delete");
        }
    }
    info!(tenant = %id, pod = %names::pod_name(&id), "tenant deleted");
    StatusCode::NO_CONTENT.into_response()
}

/// PUT /tenants/{id}/activity
pub async fn put_activity(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.registry.touch_activity(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => error_response(&err),
    }
}

/// POST /wake/{id}
pub async fn wake_tenant(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(wake) = &state.wake else {
        return error_response(&Error::Unavailable(
            "orchestration platform not configured".into(),
        ));
    };
    match wake.wake(&id).await {
        Ok(address) => Json(serde_json::json!({ "pod_address": address })).into_response(),
        Err(err) => {
            error!(tenant = %id, error = %err, "wake failed");
            error_response(&err)
        }
    }
}
