//! End-to-end scenarios and boundary behaviors, driving a full in-process
//! coordinator through the jsonrpsee method surface: `MemStore` +
//! `NullLedgerSink` + `StaticKeyIdentityProvider` + `FakeClock`.

use std::collections::HashMap;
use std::sync::Arc;

use coordinator_clock::{Clock, FakeClock, FakeIdGen, IdGen};
use coordinator_lifecycle::{Lifecycle, LifecycleConfig};
use coordinator_payments::PaymentEngine;
use coordinator_primitives::{Amount, Capability, MinerStatus, PaymentState, TenantContext, TenantId};
use coordinator_queue::{JobQueue, QueueConfig};
use coordinator_receipts::{PriceClampPolicy, ReceiptService};
use coordinator_registry::MinerRegistry;
use coordinator_rpc::{
    AssignedJobView, JobView, MinerHeartbeatResult, MinerRegisterResult, OperatorStatsResult, RateLimiter, RpcContext,
    StaticKeyIdentityProvider, SubmitJobResult,
};
use coordinator_signer::Signer;
use coordinator_store::{MemStore, Store};
use ed25519_dalek::{Signer as _, SigningKey};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::rpc_params;
use jsonrpsee::RpcModule;
use rand::rngs::OsRng;
use tokio::sync::Notify;

fn encode_b64(bytes: &[u8]) -> String {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine as _;
    URL_SAFE_NO_PAD.encode(bytes)
}

struct Harness {
    module: RpcModule<RpcContext>,
    store: Arc<dyn Store>,
    clock: Arc<FakeClock>,
    registry: Arc<MinerRegistry>,
    lifecycle: Arc<Lifecycle>,
}

fn generous_rate_limit() -> coordinator_config::RateLimit {
    coordinator_config::RateLimit { tokens: 10_000, refill_per_sec: 10_000.0 }
}

fn build(max_attempts: u32, signer_ready: bool) -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemStore::new());
    let clock = Arc::new(FakeClock::new(0));
    let clock_dyn: Arc<dyn Clock> = clock.clone();

    let payments = Arc::new(PaymentEngine::new(store.clone(), clock_dyn.clone()));
    let queue = Arc::new(JobQueue::new(store.clone(), clock_dyn.clone(), payments.clone(), QueueConfig::default()));
    let registry = Arc::new(MinerRegistry::new(store.clone(), clock_dyn.clone()));

    let signer = {
        let signer = Signer::empty();
        if signer_ready {
            signer.rotate(SigningKey::generate(&mut OsRng), "key-1");
        }
        Arc::new(signer)
    };
    let receipts = Arc::new(ReceiptService::new(signer, PriceClampPolicy::ClampAndSucceed));
    let lifecycle = Arc::new(Lifecycle::new(
        store.clone(),
        clock_dyn.clone(),
        queue.clone(),
        payments.clone(),
        receipts,
        LifecycleConfig { attempt_timeout_ms: 120_000, max_attempts, timer_scan_interval_ms: 1_000, timer_batch_max: 500 },
    ));

    let mut identity = StaticKeyIdentityProvider::default();
    identity.insert("client-key", TenantContext { tenant_id: TenantId::from("t1"), caller_id: "c1".into(), is_operator: false });
    identity.insert("miner-key", TenantContext { tenant_id: TenantId::from("t1"), caller_id: "miner".into(), is_operator: false });
    identity.insert("op-key", TenantContext { tenant_id: TenantId::from("t1"), caller_id: "op".into(), is_operator: true });

    let mut rate_limiters = HashMap::new();
    rate_limiters.insert("client", RateLimiter::new(generous_rate_limit()));
    rate_limiters.insert("miner", RateLimiter::new(generous_rate_limit()));
    rate_limiters.insert("operator", RateLimiter::new(generous_rate_limit()));

    let rpc = RpcContext {
        store: store.clone(),
        clock: clock_dyn,
        id_gen: Arc::new(FakeIdGen::new("id")) as Arc<dyn IdGen>,
        queue,
        lifecycle: lifecycle.clone(),
        registry: registry.clone(),
        payments,
        identity: Arc::new(identity),
        rate_limiters: Arc::new(rate_limiters),
        poll_notify: Arc::new(Notify::new()),
        poll_long_wait_ms_max: 10_000,
        attempt_timeout_ms: 120_000,
        miner_liveness_timeout_ms: 30_000,
    };

    let module = coordinator_rpc::build_rpc_module(rpc).unwrap();
    Harness { module, store, clock, registry, lifecycle }
}

async fn register_miner(h: &Harness, price_per_unit: u64, max_concurrency: u32) -> (String, SigningKey) {
    let signing_key = SigningKey::generate(&mut OsRng);
    let public_key_hex: String = signing_key.verifying_key().to_bytes().iter().map(|b| format!("{b:02x}")).collect();
    let result: MinerRegisterResult = h
        .module
        .call(
            "miner_register",
            rpc_params![
                "miner-key",
                public_key_hex,
                vec![Capability { model: "m1".into(), mem_bytes: 2_000_000_000, region: None, features: vec![] }],
                price_per_unit,
                max_concurrency
            ],
        )
        .await
        .unwrap();
    (result.miner_id, signing_key)
}

async fn heartbeat(h: &Harness, miner_id: &str, signing_key: &SigningKey) {
    let nonce = b"nonce";
    let signature = signing_key.sign(nonce);
    let nonce_hex: String = nonce.iter().map(|b| format!("{b:02x}")).collect();
    let signature_hex: String = signature.to_bytes().iter().map(|b| format!("{b:02x}")).collect();
    let _: MinerHeartbeatResult =
        h.module.call("miner_heartbeat", rpc_params!["miner-key", miner_id, nonce_hex, signature_hex]).await.unwrap();
}

async fn submit_job(h: &Harness, max_price: u64, ttl_ms: Option<u64>) -> SubmitJobResult {
    h.module
        .call(
            "client_submitJob",
            rpc_params![
                "client-key",
                "m1",
                1_000_000_000u64,
                Option::<String>::None,
                Vec::<String>::new(),
                encode_b64(b"p"),
                max_price,
                ttl_ms
            ],
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn scenario_a_happy_path() {
    let h = build(3, true);
    let submitted = submit_job(&h, 1_000, Some(60_000)).await;
    let (miner_id, _) = register_miner(&h, 10, 1).await;

    let jobs: Vec<AssignedJobView> = h
        .module
        .call("miner_poll", rpc_params!["miner-key", miner_id.clone(), Option::<String>::None, 1u32, 0u64])
        .await
        .unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job_id, submitted.job_id);

    let receipt: coordinator_primitives::Receipt = h
        .module
        .call(
            "miner_submitResult",
            rpc_params!["miner-key", miner_id, submitted.job_id.clone(), 1u32, 500u64, encode_b64(b"r")],
        )
        .await
        .unwrap();
    assert_eq!(receipt.amount_charged, Amount(5));

    let job: JobView = h.module.call("client_getJob", rpc_params!["client-key", submitted.job_id]).await.unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Succeeded);

    let payment = h.store.get_payment(&coordinator_primitives::PaymentId::from(submitted.payment_id.as_str())).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Released);
    assert_eq!(payment.amount_settled, Some(Amount(5)));
}

#[tokio::test]
async fn scenario_b_race_only_one_miner_wins() {
    let h = build(3, true);
    let submitted = submit_job(&h, 1_000, Some(60_000)).await;
    let (m1, _) = register_miner(&h, 10, 1).await;
    let (m2, _) = register_miner(&h, 10, 1).await;

    let jobs1: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", m1, Option::<String>::None, 1u32, 0u64]).await.unwrap();
    let jobs2: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", m2, Option::<String>::None, 1u32, 0u64]).await.unwrap();

    let total = jobs1.len() + jobs2.len();
    assert_eq!(total, 1);
    let _ = submitted;
}

#[tokio::test]
async fn scenario_c_attempt_timeout_then_retry_to_a_second_miner() {
    let h = build(2, true);
    let submitted = submit_job(&h, 1_000, Some(600_000)).await;
    let (m1, _) = register_miner(&h, 10, 1).await;

    let jobs: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", m1.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();
    assert_eq!(jobs.len(), 1);

    h.clock.advance(120_001);
    let outcome = h.lifecycle.run_timer_sweep().unwrap();
    assert_eq!(outcome.retried, 1);

    let job = h.store.get_job(&coordinator_primitives::JobId::from(submitted.job_id.as_str())).unwrap().unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Queued);
    assert_eq!(job.attempt_count, 1);
    assert!(job.exclude_miners.contains(&coordinator_primitives::MinerId::from(m1.as_str())));

    let (m2, _) = register_miner(&h, 10, 1).await;
    let jobs2: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", m2.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();
    assert_eq!(jobs2.len(), 1);

    let receipt: coordinator_primitives::Receipt = h
        .module
        .call(
            "miner_submitResult",
            rpc_params!["miner-key", m2, submitted.job_id.clone(), 2u32, 500u64, encode_b64(b"r")],
        )
        .await
        .unwrap();
    assert!(!receipt.signature.is_empty());

    let m1_row = h.store.get_miner(&coordinator_primitives::MinerId::from(m1.as_str())).unwrap().unwrap();
    assert!(!m1_row.in_flight_jobs.contains(&coordinator_primitives::JobId::from(submitted.job_id.as_str())));
}

#[tokio::test]
async fn scenario_d_miner_lost_retries_then_fails_and_refunds() {
    let h = build(1, true);
    let submitted = submit_job(&h, 1_000, Some(600_000)).await;
    let (miner_id, signing_key) = register_miner(&h, 10, 1).await;
    heartbeat(&h, &miner_id, &signing_key).await;

    let jobs: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", miner_id.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();
    assert_eq!(jobs.len(), 1);

    h.clock.advance(30_001);
    let outcome = h.registry.run_liveness_scan(30_000, 0).unwrap();
    assert_eq!(outcome.newly_offline.len(), 1);
    for (_, job_ids) in &outcome.newly_offline {
        for job_id in job_ids {
            h.lifecycle.on_miner_lost(job_id).unwrap();
        }
    }

    let job = h.store.get_job(&coordinator_primitives::JobId::from(submitted.job_id.as_str())).unwrap().unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Failed);
    let payment = h.store.get_payment(&coordinator_primitives::PaymentId::from(submitted.payment_id.as_str())).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Refunded);
    assert_eq!(h.store.get_miner(&coordinator_primitives::MinerId::from(miner_id.as_str())).unwrap().unwrap().status, MinerStatus::Offline);
}

#[tokio::test]
async fn scenario_e_cancel_while_running_refunds_and_produces_no_receipt() {
    let h = build(3, true);
    let submitted = submit_job(&h, 1_000, Some(600_000)).await;
    let (miner_id, _) = register_miner(&h, 10, 1).await;
    let _jobs: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", miner_id.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();

    let cancelled: JobView = h.module.call("client_cancelJob", rpc_params!["client-key", submitted.job_id.clone()]).await.unwrap();
    assert!(cancelled.cancel_requested);

    let result: Result<JobView, _> =
        h.module.call("miner_jobHeartbeat", rpc_params!["miner-key", miner_id, submitted.job_id.clone()]).await;
    assert!(result.is_err());

    let job = h.store.get_job(&coordinator_primitives::JobId::from(submitted.job_id.as_str())).unwrap().unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Cancelled);
    assert!(job.receipt_id.is_none());
    let payment = h.store.get_payment(&coordinator_primitives::PaymentId::from(submitted.payment_id.as_str())).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Refunded);
}

#[tokio::test]
async fn scenario_f_signer_outage_mid_finalize_fails_and_refunds() {
    let h = build(3, false);
    let submitted = submit_job(&h, 1_000, Some(600_000)).await;
    let (miner_id, _) = register_miner(&h, 10, 1).await;
    let _jobs: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", miner_id.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();

    let result: Result<coordinator_primitives::Receipt, _> = h
        .module
        .call(
            "miner_submitResult",
            rpc_params!["miner-key", miner_id.clone(), submitted.job_id.clone(), 1u32, 500u64, encode_b64(b"r")],
        )
        .await;
    assert!(result.is_err());

    let job = h.store.get_job(&coordinator_primitives::JobId::from(submitted.job_id.as_str())).unwrap().unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Failed);
    assert_eq!(job.error_kind, Some(coordinator_primitives::ErrorKind::SignerUnavailable));
    let payment = h.store.get_payment(&coordinator_primitives::PaymentId::from(submitted.payment_id.as_str())).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Refunded);
    let miner = h.store.get_miner(&coordinator_primitives::MinerId::from(miner_id.as_str())).unwrap().unwrap();
    assert!(!miner.in_flight_jobs.contains(&coordinator_primitives::JobId::from(submitted.job_id.as_str())));
}

#[tokio::test]
async fn boundary_zero_units_consumed_yields_a_zero_amount_receipt() {
    let h = build(3, true);
    let submitted = submit_job(&h, 1_000, Some(60_000)).await;
    let (miner_id, _) = register_miner(&h, 10, 1).await;
    let _jobs: Vec<AssignedJobView> =
        h.module.call("miner_poll", rpc_params!["miner-key", miner_id.clone(), Option::<String>::None, 1u32, 0u64]).await.unwrap();

    let receipt: coordinator_primitives::Receipt = h
        .module
        .call(
            "miner_submitResult",
            rpc_params!["miner-key", miner_id, submitted.job_id.clone(), 1u32, 0u64, encode_b64(b"r")],
        )
        .await
        .unwrap();
    assert_eq!(receipt.amount_charged, Amount::ZERO);
    let payment = h.store.get_payment(&coordinator_primitives::PaymentId::from(submitted.payment_id.as_str())).unwrap().unwrap();
    assert_eq!(payment.state, PaymentState::Released);
    assert_eq!(payment.amount_settled, Some(Amount::ZERO));
}

#[tokio::test]
async fn boundary_ttl_zero_expires_on_the_next_timer_tick_unassigned() {
    let h = build(3, true);
    let submitted = submit_job(&h, 1_000, Some(0)).await;

    let outcome = h.lifecycle.run_timer_sweep().unwrap();
    assert_eq!(outcome.expired, 1);

    let job = h.store.get_job(&coordinator_primitives::JobId::from(submitted.job_id.as_str())).unwrap().unwrap();
    assert_eq!(job.state, coordinator_primitives::JobState::Expired);
    assert!(job.assigned_miner_id.is_none());
}

#[tokio::test]
async fn operator_stats_reflects_queue_depth() {
    let h = build(3, true);
    let _submitted = submit_job(&h, 1_000, Some(60_000)).await;
    let stats: OperatorStatsResult = h.module.call("operator_getStats", rpc_params!["op-key"]).await.unwrap();
    assert!(stats.jobs_by_state.iter().any(|(state, count)| *state == coordinator_primitives::JobState::Queued && *count >= 1));
}
