//! Shared state handed to every RPC method: the component handles, the
//! identity provider, one rate limiter per endpoint class, and the
//! long-poll wake signal for `miner_poll`.

use std::collections::HashMap;
use std::sync::Arc;

use coordinator_clock::{Clock, IdGen};
use coordinator_lifecycle::Lifecycle;
use coordinator_payments::PaymentEngine;
use coordinator_queue::JobQueue;
use coordinator_registry::MinerRegistry;
use coordinator_store::Store;
use tokio::sync::Notify;

use crate::identity::IdentityProvider;
use crate::rate_limit::RateLimiter;

/// Endpoint classes the fixed rate-limit buckets key on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    Client,
    Miner,
    Operator,
}

impl EndpointClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Miner => "miner",
            Self::Operator => "operator",
        }
    }
}

/// Everything a method handler needs, grouped behind one `Arc` clone per
/// request (all fields are themselves cheaply cloneable handles).
#[derive(Debug, Clone)]
pub struct RpcContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub id_gen: Arc<dyn IdGen>,
    pub queue: Arc<JobQueue>,
    pub lifecycle: Arc<Lifecycle>,
    pub registry: Arc<MinerRegistry>,
    pub payments: Arc<PaymentEngine>,
    pub identity: Arc<dyn IdentityProvider>,
    pub rate_limiters: Arc<HashMap<&'static str, RateLimiter>>,
    /// Notified every time a job is admitted or retried back to `QUEUED`,
    /// waking any `miner_poll` calls parked in their long-poll wait.
    pub poll_notify: Arc<Notify>,
    pub poll_long_wait_ms_max: u64,
    pub attempt_timeout_ms: u64,
    pub miner_liveness_timeout_ms: u64,
}

impl RpcContext {
    /// Checks `key`'s budget for `class`, using the coordinator's injected
    /// clock so rate limiting is deterministic under `FakeClock` in tests.
    pub fn check_rate_limit(&self, class: EndpointClass, key: &str) -> bool {
        match self.rate_limiters.get(class.as_str()) {
            Some(limiter) => limiter.try_acquire(key, self.clock.now_ms().0),
            None => true,
        }
    }
}
