use anyhow::{Context, Result};
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, GaugeVec, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Metric name prefix for all batch analysis metrics
const PREFIX: &str = "batch_analysis";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Job Metrics
    pub static ref JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_jobs_total"), "Per-item tick outcomes"),
        &["outcome"]
    ).expect("Failed to create jobs_total metric");

    pub static ref REMOTE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_remote_errors_total"), "Remote analysis service errors by kind"),
        &["kind"]
    ).expect("Failed to create remote_errors_total metric");

    pub static ref ENQUEUED_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_enqueued_total"),
        "Items put into the analysis queue"
    ).expect("Failed to create enqueued_total metric");

    // Tick Metrics
    pub static ref TICKS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_ticks_total"),
        "Completed processing ticks"
    ).expect("Failed to create ticks_total metric");

    pub static ref TICK_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_tick_duration_seconds"),
            "Tick duration in seconds"
        )
        .buckets(vec![0.01, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0])
    ).expect("Failed to create tick_duration_seconds metric");

    // Queue Metrics
    pub static ref QUEUE_SIZE: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_queue_size"), "Items waiting in each queue"),
        &["queue"]
    ).expect("Failed to create queue_size metric");
}

/// Register all metrics with the Prometheus registry
pub fn init_metrics() {
    // Already-registered errors are expected when tests call this repeatedly
    let _ = REGISTRY.register(Box::new(JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REMOTE_ERRORS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ENQUEUED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TICKS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(TICK_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_SIZE.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_job_outcome(outcome: &str) {
    JOBS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_remote_error(kind: &str) {
    REMOTE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_enqueued(count: usize) {
    ENQUEUED_TOTAL.inc_by(count as f64);
}

pub fn record_tick(duration: Duration) {
    TICKS_TOTAL.inc();
    TICK_DURATION_SECONDS.observe(duration.as_secs_f64());
}

pub fn set_queue_sizes(waiting_for_analysis: usize, waiting_for_response: usize) {
    QUEUE_SIZE
        .with_label_values(&["waiting_for_analysis"])
        .set(waiting_for_analysis as f64);
    QUEUE_SIZE
        .with_label_values(&["waiting_for_response"])
        .set(waiting_for_response as f64);
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

pub fn metrics_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler))
}

/// Serve /metrics on `port` until `shutdown_token` is cancelled.
pub async fn run_metrics_server(port: u16, shutdown_token: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    tracing::info!("Metrics available at port {}!", port);
    axum::serve(listener, metrics_router())
        .with_graceful_shutdown(async move { shutdown_token.cancelled().await })
        .await?;
    Ok(())
}
