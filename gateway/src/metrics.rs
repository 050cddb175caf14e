//! Metrics exposition (§6, §10.7): a `/metrics` endpoint backed by the
//! default Prometheus registry, matching the teacher's `db-pool` metrics
//! idiom of a small set of process-wide gauges/counters registered once.

use actix_web::{get, HttpResponse};
use prometheus::{Encoder, TextEncoder};

#[get("/metrics")]
pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {err}");
        return HttpResponse::InternalServerError().finish();
    }
    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
