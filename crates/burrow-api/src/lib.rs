//! burrow-api — the public control surface of the orchestrator.
//!
//! # Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/healthz` | liveness |
//! | POST | `/tenants` | create a tenant record |
//! | GET | `/tenants` | list tenants (tokens redacted) |
//! | GET | `/tenants/{id}` | fetch one tenant (token redacted) |
//! | GET | `/tenants/{id}/secret` | fetch the secret token (internal) |
//! | PATCH | `/tenants/{id}` | update token and/or idle budget |
//! | DELETE | `/tenants/{id}` | tear down pod, volume, cache, webhook, record |
//! | PUT | `/tenants/{id}/activity` | refresh `last_active_at` |
//! | POST | `/wake/{id}` | ensure a running pod, return its address |

pub mod handlers;
pub mod wake;

use std::sync::Arc;

use axum::routing::{get, post, put};
use axum::Router;

use burrow_kube::Orchestrator;
use burrow_lock::AddressCache;
use burrow_messenger::Messenger;
use burrow_registry::Registry;

pub use wake::{WakeOptions, WakePipeline};

/// Shared state for the control API.
///
/// `orchestrator` and `wake` are absent in local mode; the affected
/// endpoints answer 503.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn Registry>,
    pub cache: Arc<dyn AddressCache>,
    pub orchestrator: Option<Arc<dyn Orchestrator>>,
    pub messenger: Option<Arc<dyn Messenger>>,
    pub wake: Option<Arc<WakePipeline>>,
    /// Default namespace for new tenants.
    pub namespace: String,
    /// Grace budget applied when deleting tenant pods.
    pub pod_grace_seconds: i64,
}

/// Build the control API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/tenants", post(handlers::create_tenant).get(handlers::list_tenants))
        .route(
            "/tenants/{id}",
            get(handlers::get_tenant)
                .patch(handlers::patch_tenant)
                .delete(handlers::delete_tenant),
        )
        .route("/tenants/{id}/secret", get(handlers::get_secret))
        .route("/tenants/{id}/activity", put(handlers::put_activity))
        .route("/wake/{id}", post(handlers::wake_tenant))
        .with_state(state)
}
