//! Prometheus metrics wiring.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Count requests and responses by method and status class.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    metrics::counter!("recut_http_requests_total", "method" => method.clone()).increment(1);

    let response = next.run(request).await;

    let status_class = format!("{}xx", response.status().as_u16() / 100);
    metrics::counter!(
        "recut_http_responses_total",
        "method" => method,
        "status" => status_class
    )
    .increment(1);

    response
}
