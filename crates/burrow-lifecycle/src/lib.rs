//! burrow-lifecycle — single-writer idle eviction.
//!
//! Eviction runs under leader election so the fleet never double-writes
//! status transitions from the idle path. The lease lives in the cluster's
//! coordination API; followers keep retrying acquisition and take over
//! within one lease duration of a leader failure.

mod idle;
mod leader;

pub use idle::{IdleController, COARSE_IDLE_THRESHOLD, IDLE_TICK_INTERVAL};
pub use leader::{LeaseElector, Leadership, StaticLeadership};
