//! Metrics and observability utilities
//!
//! Prometheus metrics with standardized naming. Retrieval is local and fast;
//! model calls dominate generation latency, so they get their own buckets.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all CurriForge metrics
pub const METRICS_PREFIX: &str = "curriforge";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00,
];

/// Buckets for model calls and generation chains (in seconds)
pub const MODEL_BUCKETS: &[f64] = &[
    0.500, 1.000, 2.500, 5.000, 10.00, 20.00, 30.00, 60.00, 120.0, 300.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval
    describe_counter!(
        format!("{}_retrievals_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_retrieval_results_count", METRICS_PREFIX),
        Unit::Count,
        "Context items returned by the last retrieval"
    );

    describe_counter!(
        format!("{}_ungrounded_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Retrievals that produced no context"
    );

    describe_gauge!(
        format!("{}_corpus_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks loaded per corpus source"
    );

    // Model
    describe_counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total language model requests"
    );

    describe_histogram!(
        format!("{}_model_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Language model latency in seconds"
    );

    // Generation
    describe_counter!(
        format!("{}_generations_total", METRICS_PREFIX),
        Unit::Count,
        "Generation chains by outcome"
    );

    describe_histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Draft plus critique chain latency in seconds"
    );

    describe_counter!(
        format!("{}_critique_rollbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Critique passes discarded and rolled back"
    );

    describe_counter!(
        format!("{}_revisions_total", METRICS_PREFIX),
        Unit::Count,
        "Revision requests by outcome"
    );

    describe_gauge!(
        format!("{}_active_sessions", METRICS_PREFIX),
        Unit::Count,
        "Document sessions currently held in memory"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one retrieval
pub fn record_retrieval(duration_secs: f64, result_count: usize) {
    counter!(format!("{}_retrievals_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_retrieval_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    gauge!(format!("{}_retrieval_results_count", METRICS_PREFIX)).set(result_count as f64);

    if result_count == 0 {
        counter!(format!("{}_ungrounded_requests_total", METRICS_PREFIX)).increment(1);
    }
}

/// Record the chunk count of a loaded corpus source
pub fn record_corpus_source(source_id: &str, chunks: usize) {
    gauge!(
        format!("{}_corpus_chunks", METRICS_PREFIX),
        "source" => source_id.to_string()
    )
    .set(chunks as f64);
}

/// Record one model call
pub fn record_model_call(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_model_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_model_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    }
}

/// Record a finished generation chain; `outcome` is complete, partial or failed
pub fn record_generation(duration_secs: f64, kind: &str, outcome: &str) {
    counter!(
        format!("{}_generations_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_generation_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

pub fn record_critique_rollback(reason: &str) {
    counter!(
        format!("{}_critique_rollbacks_total", METRICS_PREFIX),
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn record_revision(accepted: bool) {
    let outcome = if accepted { "accepted" } else { "rejected" };
    counter!(
        format!("{}_revisions_total", METRICS_PREFIX),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn set_active_sessions(count: usize) {
    gauge!(format!("{}_active_sessions", METRICS_PREFIX)).set(count as f64);
}
