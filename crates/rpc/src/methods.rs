//! Registers the fixed `client_*`/`miner_*`/`operator_*` method set on an
//! [`RpcModule`]. Every handler follows the same shape: parse params,
//! authenticate, check the endpoint class's rate limit, run the domain
//! call, map its error through [`ApiError`].

use std::time::Duration;

use coordinator_primitives::{JobId, MinerId, TenantId};
use jsonrpsee::RpcModule;
use jsonrpsee_types::ErrorObjectOwned;

use crate::context::{EndpointClass, RpcContext};
use crate::dto::*;
use crate::error::{ApiError, ErrorCode};
use crate::identity::IdentityProvider;

#[derive(Debug, Clone, serde::Serialize)]
pub struct Ack {
    pub ok: bool,
}

const ACK: Ack = Ack { ok: true };

fn authenticate(
    ctx: &RpcContext,
    class: EndpointClass,
    api_key: &str,
) -> Result<coordinator_primitives::TenantContext, ApiError> {
    let tenant = ctx.identity.authenticate(api_key)?;
    if !ctx.check_rate_limit(class, &tenant.caller_id) {
        return Err(ApiError::new(ErrorCode::RateLimited, "rate limit exceeded"));
    }
    Ok(tenant)
}

fn require_operator(tenant: &coordinator_primitives::TenantContext) -> Result<(), ApiError> {
    if !tenant.is_operator {
        return Err(ApiError::new(ErrorCode::Forbidden, "operator privileges required"));
    }
    Ok(())
}

/// Builds the jsonrpsee module exposing every `client_*`/`miner_*`/
/// `operator_*` method. Each handler clones its own `Arc<RpcContext>` via
/// jsonrpsee's context injection; no method holds a lock across an
/// `.await`.
pub fn build_rpc_module(ctx: RpcContext) -> Result<RpcModule<RpcContext>, jsonrpsee::core::RegisterMethodError> {
    let mut module = RpcModule::new(ctx);

    module.register_async_method("client_submitJob", |params, ctx| async move {
        let req: SubmitJobParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Client, &req.api_key).map_err(err)?;
        let payload = decode_b64("payload_b64", &req.payload_b64).map_err(err)?;
        let (job_id, payment_id) = ctx
            .queue
            .submit_job(
                ctx.id_gen.as_ref(),
                tenant.tenant_id.clone(),
                coordinator_primitives::SubmitterId::from(tenant.caller_id.clone()),
                req.requirement(),
                payload,
                coordinator_primitives::Amount(req.max_price),
                req.ttl_ms,
            )
            .map_err(ApiError::from)
            .map_err(err)?;
        ctx.poll_notify.notify_waiters();
        Ok::<_, ErrorObjectOwned>(SubmitJobResult { job_id: job_id.to_string(), payment_id: payment_id.to_string() })
    })?;

    module.register_async_method("client_getJob", |params, ctx| async move {
        let req: JobIdParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Client, &req.api_key).map_err(err)?;
        let job = load_job_for_tenant(&ctx, &req.job_id, &tenant.tenant_id).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(JobView::from(job))
    })?;

    module.register_async_method("client_cancelJob", |params, ctx| async move {
        let req: JobIdParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Client, &req.api_key).map_err(err)?;
        let job_id = JobId::from(req.job_id.as_str());
        load_job_for_tenant(&ctx, &req.job_id, &tenant.tenant_id).map_err(err)?;
        let updated = ctx.lifecycle.cancel_job(&job_id).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(JobView::from(updated))
    })?;

    module.register_async_method("client_listReceipts", |params, ctx| async move {
        let req: ListReceiptsParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Client, &req.api_key).map_err(err)?;
        let receipts = ctx
            .store
            .list_receipts_for_tenant(&tenant.tenant_id, req.limit, req.offset)
            .map_err(ApiError::from)
            .map_err(err)?;
        Ok::<_, ErrorObjectOwned>(receipts)
    })?;

    module.register_async_method("miner_register", |params, ctx| async move {
        let req: MinerRegisterParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let miner_id = ctx
            .registry
            .register(
                tenant.tenant_id,
                ctx.id_gen.as_ref(),
                req.public_key_hex,
                req.capabilities,
                coordinator_primitives::Amount(req.price_per_unit),
                req.max_concurrency,
            )
            .map_err(ApiError::from)
            .map_err(err)?;
        Ok::<_, ErrorObjectOwned>(MinerRegisterResult { miner_id: miner_id.to_string() })
    })?;

    module.register_async_method("miner_heartbeat", |params, ctx| async move {
        let req: MinerHeartbeatParams = params.parse()?;
        authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let nonce = decode_hex("nonce_hex", &req.nonce_hex).map_err(err)?;
        let signature = decode_hex("signature_hex", &req.signature_hex).map_err(err)?;
        let miner_id = MinerId::from(req.miner_id.as_str());
        let acked_ms = ctx.registry.heartbeat(&miner_id, &nonce, &signature).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(MinerHeartbeatResult {
            acked_ms: acked_ms.0,
            expires_at_ms: acked_ms.0 + ctx.miner_liveness_timeout_ms,
        })
    })?;

    module.register_async_method("miner_poll", |params, ctx| async move {
        let req: MinerPollParams = params.parse()?;
        authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let miner_id = MinerId::from(req.miner_id.as_str());
        let filter = req.model.map(|model| coordinator_primitives::CapabilityRequirement {
            model,
            min_mem_bytes: 0,
            region: None,
            required_features: vec![],
        });
        let jobs = long_poll(&ctx, &miner_id, filter.as_ref(), req.max_jobs, req.wait_ms).await.map_err(err)?;
        Ok::<_, ErrorObjectOwned>(jobs.into_iter().map(AssignedJobView::from).collect::<Vec<_>>())
    })?;

    module.register_async_method("miner_jobHeartbeat", |params, ctx| async move {
        let req: MinerJobParams = params.parse()?;
        authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let job_id = JobId::from(req.job_id.as_str());
        let miner_id = MinerId::from(req.miner_id.as_str());
        let job = ctx.lifecycle.job_heartbeat(&job_id, &miner_id).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(JobView::from(job))
    })?;

    module.register_async_method("miner_submitResult", |params, ctx| async move {
        let req: MinerSubmitResultParams = params.parse()?;
        authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let payload = decode_b64("result_payload_b64", &req.result_payload_b64).map_err(err)?;
        let job_id = JobId::from(req.job_id.as_str());
        let miner_id = MinerId::from(req.miner_id.as_str());
        let receipt = ctx
            .lifecycle
            .submit_result(&job_id, &miner_id, req.attempt, req.units_consumed, payload)
            .map_err(ApiError::from)
            .map_err(err)?;
        Ok::<_, ErrorObjectOwned>(receipt)
    })?;

    module.register_async_method("miner_submitError", |params, ctx| async move {
        let req: MinerSubmitErrorParams = params.parse()?;
        authenticate(&ctx, EndpointClass::Miner, &req.api_key).map_err(err)?;
        let job_id = JobId::from(req.job_id.as_str());
        let miner_id = MinerId::from(req.miner_id.as_str());
        ctx.lifecycle.submit_error(&job_id, &miner_id, req.attempt).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(ACK)
    })?;

    module.register_async_method("operator_drainMiner", |params, ctx| async move {
        let req: OperatorMinerParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Operator, &req.api_key).map_err(err)?;
        require_operator(&tenant).map_err(err)?;
        let miner_id = MinerId::from(req.miner_id.as_str());
        ctx.registry.drain(&miner_id).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(ACK)
    })?;

    module.register_async_method("operator_resumeMiner", |params, ctx| async move {
        let req: OperatorMinerParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Operator, &req.api_key).map_err(err)?;
        require_operator(&tenant).map_err(err)?;
        let miner_id = MinerId::from(req.miner_id.as_str());
        ctx.registry.resume(&miner_id).map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(ACK)
    })?;

    module.register_async_method("operator_getStats", |params, ctx| async move {
        let req: OperatorStatsParams = params.parse()?;
        let tenant = authenticate(&ctx, EndpointClass::Operator, &req.api_key).map_err(err)?;
        require_operator(&tenant).map_err(err)?;
        let stats = ctx.store.stats().map_err(ApiError::from).map_err(err)?;
        Ok::<_, ErrorObjectOwned>(OperatorStatsResult {
            jobs_by_state: stats.jobs_by_state,
            miners_by_status: stats.miners_by_status,
            pending_payment_events: stats.pending_payment_events,
        })
    })?;

    Ok(module)
}

fn err(e: ApiError) -> ErrorObjectOwned {
    e.into()
}

fn load_job_for_tenant(
    ctx: &RpcContext,
    job_id: &str,
    tenant_id: &TenantId,
) -> Result<coordinator_primitives::Job, ApiError> {
    let job_id = JobId::from(job_id);
    let job = ctx.store.get_job(&job_id).map_err(ApiError::from)?;
    match job {
        Some(job) if &job.tenant_id == tenant_id => Ok(job),
        // A cross-tenant lookup and a missing job look identical to the caller.
        _ => Err(ApiError::new(ErrorCode::NotFound, format!("job {job_id} not found"))),
    }
}

async fn long_poll(
    ctx: &RpcContext,
    miner_id: &MinerId,
    filter: Option<&coordinator_primitives::CapabilityRequirement>,
    max_jobs: u32,
    wait_ms_requested: u64,
) -> Result<Vec<coordinator_primitives::Job>, ApiError> {
    let wait_ms = wait_ms_requested.min(ctx.poll_long_wait_ms_max);
    let deadline = tokio::time::Instant::now() + Duration::from_millis(wait_ms);
    loop {
        let jobs = ctx
            .queue
            .poll(miner_id, filter, max_jobs, ctx.attempt_timeout_ms, ctx.miner_liveness_timeout_ms)
            .map_err(ApiError::from)?;
        if !jobs.is_empty() || wait_ms == 0 {
            return Ok(jobs);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(jobs);
        }
        let _ = tokio::time::timeout(deadline - now, ctx.poll_notify.notified()).await;
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, ApiError> {
    if value.len() % 2 != 0 {
        return Err(ApiError::new(ErrorCode::InvalidRequest, format!("{field} has odd length")));
    }
    (0..value.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&value[i..i + 2], 16)
                .map_err(|e| ApiError::new(ErrorCode::InvalidRequest, format!("{field} is not valid hex: {e}")))
        })
        .collect()
}
