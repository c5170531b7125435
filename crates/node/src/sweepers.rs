//! The three independent background passes: miner liveness decay, the job
//! timer sweep, and the payment outbox flush. Each runs on its own
//! `tokio::time::interval` so a slow pass never starves the others or
//! foreground API load.

use std::time::Duration;

use crate::context::CoordinatorContext;

/// Spawns all three sweepers, returning their join handles so `main` can
/// hold them for the process lifetime (they run until the process exits;
/// there is no graceful per-sweeper shutdown beyond process termination).
pub fn spawn_all(ctx: &CoordinatorContext) -> Vec<tokio::task::JoinHandle<()>> {
    vec![spawn_liveness_sweep(ctx), spawn_timer_sweep(ctx), spawn_payment_flush(ctx)]
}

fn spawn_liveness_sweep(ctx: &CoordinatorContext) -> tokio::task::JoinHandle<()> {
    let registry = ctx.registry.clone();
    let lifecycle = ctx.lifecycle.clone();
    let liveness_timeout_ms = ctx.config.registry.miner_liveness_timeout_ms;
    let interval_ms = ctx.config.registry.heartbeat_scan_interval_ms;
    let batch_max = ctx.config.lifecycle.timer_batch_max;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            ticker.tick().await;
            let outcome = match registry.run_liveness_scan(liveness_timeout_ms, batch_max) {
                Ok(outcome) => outcome,
                Err(err) => {
                    tracing::warn!(error = %err, "liveness sweep failed");
                    continue;
                }
            };
            for (miner_id, jobs) in outcome.newly_offline {
                for job_id in jobs {
                    if let Err(err) = lifecycle.on_miner_lost(&job_id) {
                        tracing::warn!(%miner_id, %job_id, error = %err, "failed to retry job lost to an offline miner");
                    }
                }
            }
        }
    })
}

fn spawn_timer_sweep(ctx: &CoordinatorContext) -> tokio::task::JoinHandle<()> {
    let lifecycle = ctx.lifecycle.clone();
    let interval_ms = ctx.config.lifecycle.timer_scan_interval_ms;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms.max(1)));
        loop {
            ticker.tick().await;
            match lifecycle.run_timer_sweep() {
                Ok(outcome) => {
                    if outcome.expired > 0 || outcome.retried > 0 || outcome.attempt_timed_out_failed > 0 {
                        tracing::debug!(
                            expired = outcome.expired,
                            retried = outcome.retried,
                            attempt_timed_out_failed = outcome.attempt_timed_out_failed,
                            already_settled = outcome.already_settled,
                            "timer sweep pass"
                        );
                    }
                }
                Err(err) => tracing::warn!(error = %err, "timer sweep failed"),
            }
        }
    })
}

fn spawn_payment_flush(ctx: &CoordinatorContext) -> tokio::task::JoinHandle<()> {
    let payments = ctx.payments.clone();
    let ledger_sink = ctx.ledger_sink.clone();
    let batch_max = ctx.config.lifecycle.timer_batch_max;

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(1_000));
        loop {
            ticker.tick().await;
            if let Err(err) = payments.flush_outbox(ledger_sink.as_ref(), batch_max).await {
                tracing::warn!(error = %err, "payment outbox flush failed");
            }
        }
    })
}
