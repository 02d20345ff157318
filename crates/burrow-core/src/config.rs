//! Process configuration, read from the environment at startup.
//!
//! Both processes are configured the twelve-factor way. `from_env` reads the
//! real environment; `from_lookup` takes any key→value function so tests can
//! feed configuration without mutating process globals.

use std::time::Duration;

/// Configuration for the orchestrator process.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Registry key namespace inside the backing store.
    pub registry_table: String,
    /// Registry store address. Defaults to the lock service address.
    pub registry_addr: String,
    /// Lock/cache service address.
    pub lock_addr: String,
    /// Target platform namespace for tenant pods.
    pub namespace: String,
    /// Durable-storage root for tenant prefixes.
    pub storage_bucket: String,
    /// Warm-pool replica target. Zero disables the warm-pool manager.
    pub warm_pool_target: i32,
    /// Agent container image reference.
    pub agent_image: String,
    /// Container runtime class for tenant isolation.
    pub isolation_runtime: String,
    /// This process's identity in leader election.
    pub leader_id: String,
    /// Public router URL used for webhook registration, when set.
    pub router_public_base: Option<String>,
    /// Messaging bot API base URL override, when set.
    pub messaging_api_base: Option<String>,
    /// HTTP listen port.
    pub port: u16,
    /// Exclusive wake window per tenant.
    pub wake_lock_ttl: Duration,
    /// Provisioning budget for pod readiness.
    pub pod_ready_wait: Duration,
    /// Graceful-termination budget for tenant pods, in seconds.
    pub pod_grace_seconds: i64,
    /// Run with in-memory stores and no cluster access.
    pub local_mode: bool,
}

impl OrchestratorConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lock_addr = string_or(&lookup, "LOCK_ADDR", "redis://127.0.0.1:6379");
        let leader_default = match lookup("POD_NAME") {
            Some(pod) => format!("orchestrator-{pod}"),
            None => "orchestrator-local".to_string(),
        };
        Self {
            registry_table: string_or(&lookup, "REGISTRY_TABLE", "tenant-registry"),
            registry_addr: lookup("REGISTRY_ADDR").unwrap_or_else(|| lock_addr.clone()),
            lock_addr,
            namespace: string_or(&lookup, "NAMESPACE", "tenants"),
            storage_bucket: string_or(&lookup, "STORAGE_BUCKET", "burrow-tenant-state"),
            warm_pool_target: parse_or(&lookup, "WARM_POOL_TARGET", 0),
            agent_image: string_or(&lookup, "AGENT_IMAGE", "burrow-agent:latest"),
            isolation_runtime: string_or(&lookup, "ISOLATION_RUNTIME", "kata-qemu"),
            leader_id: lookup("LEADER_ID").unwrap_or(leader_default),
            router_public_base: lookup("ROUTER_PUBLIC_BASE"),
            messaging_api_base: lookup("MESSAGING_API_BASE"),
            port: parse_or(&lookup, "PORT", 8080),
            wake_lock_ttl: Duration::from_secs(parse_or(&lookup, "WAKE_LOCK_TTL_S", 240)),
            pod_ready_wait: Duration::from_secs(parse_or(&lookup, "POD_READY_WAIT_S", 210)),
            pod_grace_seconds: parse_or(&lookup, "POD_GRACE_S", 30),
            local_mode: lookup("LOCAL_MODE").as_deref() == Some("true"),
        }
    }
}

/// Configuration for the ingress router process.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Lock/cache service address (shared with the orchestrator).
    pub lock_addr: String,
    /// Orchestrator public API address.
    pub orchestrator_addr: String,
    /// Public base URL of this router, used in webhook registration.
    pub public_base: Option<String>,
    /// Messaging bot API base URL override, when set.
    pub messaging_api_base: Option<String>,
    /// HTTP listen port.
    pub port: u16,
    /// Port the agent container listens on.
    pub agent_port: u16,
    /// Upper bound on a wake triggered from the ingress path.
    pub wake_budget: Duration,
    /// Run with in-memory cache (no lock service).
    pub local_mode: bool,
}

impl RouterConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            lock_addr: string_or(&lookup, "LOCK_ADDR", "redis://127.0.0.1:6379"),
            orchestrator_addr: string_or(&lookup, "ORCHESTRATOR_ADDR", "http://127.0.0.1:8080"),
            public_base: lookup("ROUTER_PUBLIC_BASE"),
            messaging_api_base: lookup("MESSAGING_API_BASE"),
            port: parse_or(&lookup, "PORT", 9090),
            agent_port: parse_or(&lookup, "AGENT_PORT", 3000),
            // Cold starts that provision a fresh node can take minutes; the
            // dispatch deadline adds slack on top of this.
            wake_budget: Duration::from_secs(parse_or(&lookup, "POD_READY_WAIT_S", 300)),
            local_mode: lookup("LOCAL_MODE").as_deref() == Some("true"),
        }
    }
}

fn string_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}
