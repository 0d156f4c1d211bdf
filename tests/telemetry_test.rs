//! Integration tests for telemetry initialization and span helpers.

use chrono::Utc;
use uuid::Uuid;

#[test]
fn telemetry_initializes_without_endpoint() {
    // A global subscriber can only be set once per process, so this may
    // return Err if another test got there first; that is acceptable.
    let config = tracker_dispatch::telemetry::TelemetryConfig {
        endpoint: None,
        service_name: "tracker-dispatch-test".to_string(),
        log_level: "debug".to_string(),
    };
    if let Ok(guard) = tracker_dispatch::telemetry::init_telemetry(config) {
        assert!(!guard.exporting());
        guard.force_flush();
    }
}

#[test]
fn dispatch_span_records_transition_and_outcome() {
    let item = tracker_dispatch::model::WorkItem::new("issue-7", "Fix login", Utc::now())
        .identifier("ENG-7");
    let span = tracker_dispatch::telemetry::dispatch::start_dispatch_span(&item, &Uuid::new_v4());
    tracker_dispatch::telemetry::dispatch::record_label_transition(
        &span,
        "pilot",
        "pilot-in-progress",
    );
    tracker_dispatch::telemetry::dispatch::record_outcome(&span, "succeeded");
}

#[test]
fn metric_instruments_accept_measurements_without_a_provider() {
    use opentelemetry::KeyValue;
    use tracker_dispatch::telemetry::metrics;

    metrics::items_dispatched().add(1, &[KeyValue::new("scope", "ENG")]);
    metrics::executions().add(1, &[KeyValue::new("result", "failed")]);
    metrics::execution_duration_ms().record(12.5, &[]);
    metrics::ledger_operations().add(1, &[KeyValue::new("operation", "mark")]);
}
