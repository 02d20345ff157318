//! burrow-router — the ingress edge.
//!
//! Receives platform events at `POST /inbound/{tenant_id}`, acknowledges
//! the sender synchronously (the upstream has a short response budget), and
//! does everything else — cache lookup, wake-on-miss, forward, reply
//! delivery, activity refresh — in a detached task. The router is
//! stateless; replicas share only the address cache.

mod client;
mod ingress;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use burrow_lock::AddressCache;
use burrow_messenger::Messenger;

pub use client::OrchestratorClient;

/// Upper bound on inbound event bodies.
pub const MAX_INBOUND_BODY: usize = 1 << 20;
/// Slack added on top of the wake budget for the async dispatch deadline.
pub const DISPATCH_SLACK: Duration = Duration::from_secs(30);

/// Shared state for the ingress handlers.
#[derive(Clone)]
pub struct RouterState {
    pub cache: Arc<dyn AddressCache>,
    pub orchestrator: Arc<OrchestratorClient>,
    pub messenger: Arc<dyn Messenger>,
    /// HTTP client used to forward events to agent pods.
    pub http: reqwest::Client,
    /// Port agent pods listen on.
    pub agent_port: u16,
    /// Wake budget; the dispatch deadline is this plus slack.
    pub wake_budget: Duration,
}

impl RouterState {
    /// Deadline for one async dispatch.
    pub fn dispatch_budget(&self) -> Duration {
        self.wake_budget + DISPATCH_SLACK
    }
}

/// Build the ingress router.
pub fn build_router(state: RouterState) -> Router {
    Router::new()
        .route("/healthz", get(ingress::healthz))
        .route("/inbound/{tenant_id}", post(ingress::inbound))
        .route("/admin/webhook/{tenant_id}", post(ingress::register_webhook))
        .layer(DefaultBodyLimit::max(MAX_INBOUND_BODY))
        .with_state(state)
}
