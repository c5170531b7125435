//! Installs the process-wide Prometheus recorder and publishes the gauges
//! that summarize `Store` state for the operator `/metrics` surface.
//!
//! The counters and histograms the rest of the workspace records inline
//! (`metrics::counter!("assignment_races_total")` in `coordinator-queue`,
//! `metrics::histogram!("receipt_seal_duration_ms")` in
//! `coordinator-lifecycle`, and so on) need no declaration here — `metrics`
//! macros register on first use. This crate only owns what needs a single
//! process-wide home: recorder installation and the periodic gauge snapshot
//! of `Store::stats`, mirroring the gauge-struct shape of a storage engine's
//! own metrics module but built against the coordinator's `StoreStats`
//! instead of database internals.

#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

use coordinator_store::{Store, StoreStats};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Failures installing the process-wide recorder.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// `metrics_exporter_prometheus` failed to build or install the
    /// recorder (most commonly: one was already installed).
    #[error("failed to install prometheus recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}

/// Installs the process-wide Prometheus recorder and returns a handle whose
/// [`PrometheusHandle::render`] backs the `/metrics` HTTP endpoint.
/// Must be called exactly once per process, before any `metrics::*!` macro
/// invocation that should be captured.
pub fn install_recorder() -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    tracing::info!("metrics: prometheus recorder installed");
    Ok(handle)
}

/// Snapshots `store.stats()` into the gauges the operator dashboard reads:
/// open job counts per state, miner counts per status, and outbox depth.
/// Intended to be called periodically (alongside the timer sweep) rather
/// than per-request, since `Store::stats` is a full scan over `MemStore`.
pub fn publish_store_stats(store: &dyn Store) {
    let stats = match store.stats() {
        Ok(stats) => stats,
        Err(err) => {
            tracing::warn!(error = %err, "metrics: failed to read store stats");
            return;
        }
    };
    record_stats(&stats);
}

fn record_stats(stats: &StoreStats) {
    for (state, count) in &stats.jobs_by_state {
        metrics::gauge!("jobs_by_state", "state" => format!("{state:?}")).set(*count as f64);
    }
    for (status, count) in &stats.miners_by_status {
        metrics::gauge!("miners_by_status", "status" => format!("{status:?}")).set(*count as f64);
    }
    metrics::gauge!("payment_outbox_depth").set(stats.pending_payment_events as f64);
}
