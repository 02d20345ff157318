//! Lease-based leader election.
//!
//! One `Lease` object in the target namespace arbitrates leadership across
//! controller replicas. Acquisition and renewal are compare-and-swap writes
//! carrying the object's resource version, so two replicas racing for an
//! expired lease cannot both win. Parameters follow the usual coordination
//! tuning: 15 s lease duration, renewal every 2 s, takeover allowed once the
//! holder's renew time is a full lease duration stale.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use burrow_core::{Error, Result};

/// Name of the controller leader lease.
pub const LEASE_NAME: &str = "burrow-controller-leader";
/// How long a granted lease is valid without renewal.
pub const LEASE_DURATION: Duration = Duration::from_secs(15);
/// How often the elector tries to acquire or renew.
pub const RETRY_PERIOD: Duration = Duration::from_secs(2);

/// Read-side view of leadership. The idle controller consults this before
/// each tick; everything else ignores it.
pub trait Leadership: Send + Sync {
    fn is_leading(&self) -> bool;
}

/// Fixed or manually toggled leadership for tests and single-replica runs.
#[derive(Default)]
pub struct StaticLeadership {
    leading: AtomicBool,
}

impl StaticLeadership {
    pub fn new(leading: bool) -> Self {
        let s = Self::default();
        s.leading.store(leading, Ordering::SeqCst);
        s
    }

    pub fn set(&self, leading: bool) {
        self.leading.store(leading, Ordering::SeqCst);
    }
}

impl Leadership for StaticLeadership {
    fn is_leading(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }
}

/// Elector over a cluster `Lease` object.
pub struct LeaseElector {
    api: Api<Lease>,
    identity: String,
    leading: Arc<AtomicBool>,
}

impl Leadership for LeaseElector {
    fn is_leading(&self) -> bool {
        self.leading.load(Ordering::SeqCst)
    }
}

impl LeaseElector {
    pub fn new(client: Client, namespace: &str, identity: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            identity: identity.to_string(),
            leading: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Acquire-and-renew loop. Runs until shutdown; releases the lease on a
    /// clean exit so the next leader does not wait out the full duration.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(identity = %self.identity, lease = LEASE_NAME, "leader election starting");
        loop {
            let was_leading = self.is_leading();
            match self.try_round().await {
                Ok(leading) => {
                    self.leading.store(leading, Ordering::SeqCst);
                    if leading && !was_leading {
                        info!(identity = %self.identity, "became leader");
                    } else if !leading && was_leading {
                        info!(identity = %self.identity, "lost leadership");
                    }
                }
                Err(err) => {
                    // A round that cannot reach the API counts as not
                    // leading; the lease expires server-side regardless.
                    self.leading.store(false, Ordering::SeqCst);
                    warn!(error = %err, "leader election round failed");
                }
            }
            tokio::select! {
                _ = tokio::time::sleep(RETRY_PERIOD) => {}
                _ = shutdown.changed() => break,
            }
        }
        if self.is_leading() {
            if let Err(err) = self.release().await {
                warn!(error = %err, "lease release failed");
            }
            self.leading.store(false, Ordering::SeqCst);
        }
        info!(identity = %self.identity, "leader election stopped");
    }

    /// One acquisition round: create, renew, or take over the lease.
    async fn try_round(&self) -> Result<bool> {
        let now = MicroTime(Utc::now());
        match self.api.get_opt(LEASE_NAME).await.map_err(lease_err)? {
            None => {
                let lease = Lease {
                    metadata: ObjectMeta {
                        name: Some(LEASE_NAME.into()),
                        ..Default::default()
                    },
                    spec: Some(LeaseSpec {
                        holder_identity: Some(self.identity.clone()),
                        lease_duration_seconds: Some(LEASE_DURATION.as_secs() as i32),
                        acquire_time: Some(now.clone()),
                        renew_time: Some(now),
                        lease_transitions: Some(0),
                        ..Default::default()
                    }),
                };
                match self.api.create(&PostParams::default(), &lease).await {
                    Ok(_) => Ok(true),
                    // Lost the creation race.
                    Err(err) if api_code(&err) == Some(409) => Ok(false),
                    Err(err) => Err(lease_err(err)),
                }
            }
            Some(mut lease) => {
                let spec = lease.spec.clone().unwrap_or_default();
                let holder = spec.holder_identity.clone().unwrap_or_default();
                let duration = spec
                    .lease_duration_seconds
                    .unwrap_or(LEASE_DURATION.as_secs() as i32);
                let expired = match spec.renew_time.as_ref() {
                    Some(t) => t.0 + chrono::Duration::seconds(i64::from(duration)) < Utc::now(),
                    None => true,
                };

                if holder == self.identity {
                    let new_spec = lease.spec.get_or_insert_with(Default::default);
                    new_spec.renew_time = Some(now);
                    self.replace_cas(lease).await
                } else if holder.is_empty() || expired {
                    debug!(previous = %holder, "taking over stale lease");
                    let new_spec = lease.spec.get_or_insert_with(Default::default);
                    new_spec.holder_identity = Some(self.identity.clone());
                    new_spec.acquire_time = Some(now.clone());
                    new_spec.renew_time = Some(now);
                    new_spec.lease_transitions =
                        Some(spec.lease_transitions.unwrap_or(0) + 1);
                    self.replace_cas(lease).await
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Replace the lease at its current resource version. A conflict means
    /// another replica wrote first and this round is lost.
    async fn replace_cas(&self, lease: Lease) -> Result<bool> {
        match self.api.replace(LEASE_NAME, &PostParams::default(), &lease).await {
            Ok(_) => Ok(true),
            Err(err) if api_code(&err) == Some(409) => Ok(false),
            Err(err) => Err(lease_err(err)),
        }
    }

    /// Clear the holder so the next candidate acquires immediately.
    async fn release(&self) -> Result<()> {
        let Some(mut lease) = self.api.get_opt(LEASE_NAME).await.map_err(lease_err)? else {
            return Ok(());
        };
        let spec = lease.spec.get_or_insert_with(Default::default);
        if spec.holder_identity.as_deref() != Some(self.identity.as_str()) {
            return Ok(());
        }
        spec.holder_identity = Some(String::new());
        self.replace_cas(lease).await.map(|_| ())
    }
}

fn api_code(err: &kube::Error) -> Option<u16> {
    match err {
        kube::Error::Api(resp) => Some(resp.code),
        _ => None,
    }
}

fn lease_err(err: kube::Error) -> Error {
    Error::Unavailable(format!("leader lease: {err}"))
}
