//! Metric instrument factories for tracker-dispatch.
//!
//! Instruments come from the `"tracker-dispatch"` meter on the globally
//! registered `MeterProvider`; without one they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("tracker-dispatch")
}

/// Counter: work items handed to a worker.
/// Labels: `scope`.
pub fn items_dispatched() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.items.dispatched")
        .with_description("Work items dispatched to a worker")
        .build()
}

/// Counter: work items seen by a scan but not dispatched.
/// Labels: `scope`, `reason` ("status_label" | "project").
pub fn items_skipped() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.items.skipped")
        .with_description("Work items skipped during a scan")
        .build()
}

/// Counter: finished executions.
/// Labels: `result` ("succeeded" | "unsuccessful" | "failed").
pub fn executions() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.executions")
        .with_description("Finished executions by result")
        .build()
}

/// Histogram: execution wall time in milliseconds.
pub fn execution_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("dispatch.execution.duration_ms")
        .with_description("Execution duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: best-effort label mutations.
/// Labels: `role`, `operation` ("add" | "remove"), `result` ("ok" | "error").
pub fn label_mutations() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.label.mutations")
        .with_description("Status label mutations against the tracker")
        .build()
}

/// Counter: orphaned in-progress items released at startup.
pub fn orphans_recovered() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.orphans.recovered")
        .with_description("Orphaned in-progress items recovered at startup")
        .build()
}

/// Counter: ledger queries.
/// Labels: `operation`.
pub fn ledger_operations() -> Counter<u64> {
    meter()
        .u64_counter("dispatch.ledger.operations")
        .with_description("Dispatch ledger operations")
        .build()
}
