//! Prometheus metrics for backoffice-service.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, Encoder, HistogramVec, TextEncoder,
};

/// Histogram for database query duration by operation.
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "backoffice_db_query_duration_seconds",
        "Database query duration in seconds",
        &["operation"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Counter for payroll operations.
pub static PAYROLL_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_payroll_operations_total",
        "Total number of payroll operations",
        &["operation", "status"]
    )
    .expect("Failed to register PAYROLL_OPERATIONS")
});

/// Counter for table move operations.
pub static TABLE_MOVE_OPERATIONS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_table_move_operations_total",
        "Total number of table availability/move operations",
        &["operation", "status"]
    )
    .expect("Failed to register TABLE_MOVE_OPERATIONS")
});

/// Counter for errors.
pub static ERRORS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "backoffice_errors_total",
        "Total number of errors",
        &["error_type"]
    )
    .expect("Failed to register ERRORS")
});

/// Initialize all metrics (forces lazy initialization).
pub fn init_metrics() {
    Lazy::force(&DB_QUERY_DURATION);
    Lazy::force(&PAYROLL_OPERATIONS);
    Lazy::force(&TABLE_MOVE_OPERATIONS);
    Lazy::force(&ERRORS);
}

/// Get all metrics as Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

/// Record a payroll operation.
pub fn record_payroll_operation(operation: &str, status: &str) {
    PAYROLL_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record a table availability/move operation.
pub fn record_table_move_operation(operation: &str, status: &str) {
    TABLE_MOVE_OPERATIONS
        .with_label_values(&[operation, status])
        .inc();
}

/// Record an error.
pub fn record_error(error_type: &str) {
    ERRORS.with_label_values(&[error_type]).inc();
}
