//! Harness metrics registry
//!
//! Metrics are registered lazily on first access using once_cell::Lazy and
//! can be rendered in the Prometheus text format with [`gather_text`].

use once_cell::sync::Lazy;
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, GaugeVec, Histogram, IntCounter, IntCounterVec, TextEncoder,
};

/// Trials finished, by outcome (`ok` or a `TrialError::kind`).
pub static TRIALS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "perfbench_trials_total",
        "Total number of trials by outcome",
        &["outcome"]
    )
    .expect("Failed to register trials counter")
});

/// Wall-clock duration of whole trials, setup through cleanup.
pub static TRIAL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "perfbench_trial_duration_seconds",
        "Trial duration in seconds",
        vec![1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]
    )
    .expect("Failed to register trial duration histogram")
});

/// Throughput of the most recent trial per test and thread count.
pub static TRIAL_THROUGHPUT: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "perfbench_trial_throughput_ops",
        "Operations per second measured by the latest trial",
        &["test", "threads"]
    )
    .expect("Failed to register trial throughput gauge")
});

/// Number of times a quiesce poll found pending drops and retried.
pub static QUIESCE_RETRIES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "perfbench_quiesce_retries_total",
        "Total number of quiesce poll retries"
    )
    .expect("Failed to register quiesce retry counter")
});

/// Renders every registered metric in the Prometheus text format.
pub fn gather_text() -> String {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buffer) {
        tracing::warn!(error = %err, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
