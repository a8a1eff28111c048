use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

lazy_static! {
    // Attempt lifecycle
    pub static ref ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "practice_attempts_total",
        "Practice attempts by lifecycle outcome",
        &["outcome"]
    )
    .unwrap();

    pub static ref WRONG_SUBMISSIONS_TOTAL: IntCounter = register_int_counter!(
        "practice_wrong_submissions_total",
        "Failed submissions recorded against open attempts"
    )
    .unwrap();

    // Mastery
    pub static ref BAND_TRANSITIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "practice_band_transitions_total",
        "Difficulty band changes",
        &["direction"]
    )
    .unwrap();

    // Selection
    pub static ref SELECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "practice_selections_total",
        "Next-problem selections",
        &["result"]
    )
    .unwrap();

    // Hints
    pub static ref HINTS_SERVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "practice_hints_served_total",
        "Hints served by tier and source",
        &["tier", "source"]
    )
    .unwrap();

    // Store
    pub static ref STORE_OPERATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "practice_store_operations_total",
        "Document store operations",
        &["operation", "status"]
    )
    .unwrap();

    pub static ref STORE_OPERATION_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "practice_store_operation_duration_seconds",
        "Document store operation duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}

/// Helper: track a store operation with metrics
pub async fn track_store_operation<F, T>(operation: &str, future: F) -> Result<T, anyhow::Error>
where
    F: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let start = std::time::Instant::now();
    let result = future.await;
    let duration = start.elapsed().as_secs_f64();

    let status = if result.is_ok() { "success" } else { "error" };

    STORE_OPERATIONS_TOTAL
        .with_label_values(&[operation, status])
        .inc();

    STORE_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration);

    result
}

pub fn record_hint_served(tier: u8, source: &str) {
    HINTS_SERVED_TOTAL
        .with_label_values(&[tier.to_string().as_str(), source])
        .inc();
}
