use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramOpts, HistogramVec, Opts, TextEncoder,
};

lazy_static! {
    // Registration metrics
    pub static ref REGISTRATIONS_SENT: Counter = register_counter!(Opts::new(
        "entrig_registrations_sent_total",
        "Registrations that reached the backend"
    ))
    .unwrap();

    pub static ref REGISTRATIONS_SKIPPED: Counter = register_counter!(Opts::new(
        "entrig_registrations_skipped_total",
        "Registrations short-circuited by the idempotency check"
    ))
    .unwrap();

    // Inbound message metrics
    pub static ref MESSAGES_RECEIVED: Counter = register_counter!(Opts::new(
        "entrig_messages_received_total",
        "Inbound push messages"
    ))
    .unwrap();

    pub static ref DUPLICATES_SUPPRESSED: CounterVec = register_counter_vec!(
        Opts::new(
            "entrig_duplicates_suppressed_total",
            "Repeated arrivals or opens ignored by the seen-set"
        ),
        &["kind"]
    )
    .unwrap();

    pub static ref STATUS_REPORTS: CounterVec = register_counter_vec!(
        Opts::new(
            "entrig_status_reports_total",
            "Delivery status reports by status and outcome"
        ),
        &["status", "outcome"]
    )
    .unwrap();

    // Timing metrics
    pub static ref BACKEND_REQUEST_TIME: HistogramVec = register_histogram_vec!(
        HistogramOpts::new(
            "entrig_backend_request_seconds",
            "Latency of backend calls"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["endpoint"]
    )
    .unwrap();
}

/// Every registered metric in the Prometheus text format.
pub fn render_metrics() -> String {
    TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_else(|e| format!("# failed to encode metrics: {}", e))
}
