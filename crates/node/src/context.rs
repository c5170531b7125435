//! Pure composition: wires every component crate into a running
//! [`CoordinatorContext`], the `coordinator-node` analogue of a
//! `NodeBuilder`. No business logic lives here.

use std::collections::HashMap;
use std::sync::Arc;

use coordinator_clock::{Clock, IdGen, RandomIdGen, SystemClock};
use coordinator_config::{CoordinatorConfig, RateLimit};
use coordinator_lifecycle::{Lifecycle, LifecycleConfig};
use coordinator_payments::{LedgerSink, NullLedgerSink, PaymentEngine};
use coordinator_primitives::TenantContext;
use coordinator_queue::JobQueue;
use coordinator_receipts::{PriceClampPolicy, ReceiptService};
use coordinator_registry::MinerRegistry;
use coordinator_rpc::{RateLimiter, RpcContext, StaticKeyIdentityProvider};
use coordinator_signer::Signer;
use coordinator_store::{MemStore, Store};
use tokio::sync::Notify;

/// Failures constructing a [`CoordinatorContext`] from a loaded config.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The configured signing key could not be loaded.
    #[error("failed to load signing key: {0}")]
    Signer(#[from] coordinator_signer::SignerError),
}

/// Every component handle the rest of the binary needs, plus the
/// [`RpcContext`] the jsonrpsee server is built from.
#[derive(Debug, Clone)]
pub struct CoordinatorContext {
    pub store: Arc<dyn Store>,
    pub clock: Arc<dyn Clock>,
    pub signer: Arc<Signer>,
    pub registry: Arc<MinerRegistry>,
    pub queue: Arc<JobQueue>,
    pub payments: Arc<PaymentEngine>,
    pub lifecycle: Arc<Lifecycle>,
    pub ledger_sink: Arc<dyn LedgerSink>,
    pub rpc: RpcContext,
    pub config: CoordinatorConfig,
}

/// Builds every component from `config`, using the production
/// [`SystemClock`]/[`RandomIdGen`] and an in-memory [`MemStore`] (the only
/// `Store` implementation this reference server ships).
pub fn build(config: CoordinatorConfig) -> Result<CoordinatorContext, BuildError> {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let id_gen: Arc<dyn IdGen> = Arc::new(RandomIdGen);

    let signer = Arc::new(Signer::load_from_file(&config.signer.signing_key_path, &config.signer.signing_key_id)?);

    let payments = Arc::new(PaymentEngine::new(store.clone(), clock.clone()));
    let queue = Arc::new(JobQueue::new(store.clone(), clock.clone(), payments.clone(), config.queue));
    let registry = Arc::new(MinerRegistry::new(store.clone(), clock.clone()));
    let receipts = Arc::new(ReceiptService::new(signer.clone(), PriceClampPolicy::ClampAndSucceed));
    let lifecycle = Arc::new(Lifecycle::new(
        store.clone(),
        clock.clone(),
        queue.clone(),
        payments.clone(),
        receipts,
        LifecycleConfig {
            attempt_timeout_ms: config.lifecycle.attempt_timeout_ms,
            max_attempts: config.lifecycle.max_attempts,
            timer_scan_interval_ms: config.lifecycle.timer_scan_interval_ms,
            timer_batch_max: config.lifecycle.timer_batch_max,
        },
    ));

    let ledger_sink: Arc<dyn LedgerSink> = Arc::new(NullLedgerSink);

    let mut identity = StaticKeyIdentityProvider::default();
    for (api_key, entry) in &config.identity.keys {
        identity.insert(
            api_key.clone(),
            TenantContext {
                tenant_id: coordinator_primitives::TenantId::from(entry.tenant_id.as_str()),
                caller_id: entry.caller_id.clone(),
                is_operator: entry.is_operator,
            },
        );
    }

    let mut rate_limiters = HashMap::new();
    rate_limiters.insert("client", RateLimiter::new(rate_limit(&config, "client")));
    rate_limiters.insert("miner", RateLimiter::new(rate_limit(&config, "miner")));
    rate_limiters.insert("operator", RateLimiter::new(rate_limit(&config, "operator")));

    let rpc = RpcContext {
        store: store.clone(),
        clock: clock.clone(),
        id_gen,
        queue: queue.clone(),
        lifecycle: lifecycle.clone(),
        registry: registry.clone(),
        payments: payments.clone(),
        identity: Arc::new(identity),
        rate_limiters: Arc::new(rate_limiters),
        poll_notify: Arc::new(Notify::new()),
        poll_long_wait_ms_max: config.rpc.poll_long_wait_ms_max,
        attempt_timeout_ms: config.lifecycle.attempt_timeout_ms,
        miner_liveness_timeout_ms: config.registry.miner_liveness_timeout_ms,
    };

    Ok(CoordinatorContext { store, clock, signer, registry, queue, payments, lifecycle, ledger_sink, rpc, config })
}

fn rate_limit(config: &CoordinatorConfig, class: &str) -> RateLimit {
    config.rpc.rate_limits.get(class).copied().unwrap_or(RateLimit { tokens: 100, refill_per_sec: 20.0 })
}
