//! The operator-facing HTTP listener: `/healthz/live`, `/healthz/ready`,
//! and `/metrics`. Deliberately separate from the jsonrpsee JSON-RPC
//! listener so a load balancer can probe liveness without touching the
//! RPC surface.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;

use crate::context::CoordinatorContext;

/// Binds `addr` and serves health/metrics requests until the process
/// exits. Each accepted connection is handled on its own task; this
/// listener never needs HTTP/2 or keep-alive tuning.
pub async fn serve(
    addr: SocketAddr,
    ctx: CoordinatorContext,
    metrics_handle: PrometheusHandle,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "observability listener bound");
    let ctx = Arc::new(ctx);
    let metrics_handle = Arc::new(metrics_handle);

    loop {
        let (stream, peer) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let ctx = ctx.clone();
        let metrics_handle = metrics_handle.clone();
        tokio::spawn(async move {
            let service = hyper::service::service_fn(move |req| {
                let ctx = ctx.clone();
                let metrics_handle = metrics_handle.clone();
                async move { handle(req, ctx, metrics_handle).await }
            });
            if let Err(err) = ConnBuilder::new(hyper_util::rt::TokioExecutor::new()).serve_connection(io, service).await {
                tracing::debug!(%peer, error = %err, "observability connection closed with an error");
            }
        });
    }
}

async fn handle(
    req: Request<Incoming>,
    ctx: Arc<CoordinatorContext>,
    metrics_handle: Arc<PrometheusHandle>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match req.uri().path() {
        "/healthz/live" => text(StatusCode::OK, "ok"),
        "/healthz/ready" => {
            if ctx.signer.is_ready() && ctx.store.stats().is_ok() {
                text(StatusCode::OK, "ready")
            } else {
                text(StatusCode::SERVICE_UNAVAILABLE, "not ready")
            }
        }
        "/metrics" => {
            coordinator_metrics::publish_store_stats(ctx.store.as_ref());
            text(StatusCode::OK, &metrics_handle.render())
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    };
    Ok(response)
}

fn text(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body.to_owned())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
