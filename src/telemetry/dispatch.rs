//! Per-dispatch span helpers.

use tracing::Span;
use uuid::Uuid;

use crate::model::WorkItem;

/// Start the span covering one work item from claim to final label.
///
/// `dispatch.outcome` is declared empty and filled in by
/// [`record_outcome`].
pub fn start_dispatch_span(item: &WorkItem, dispatch_id: &Uuid) -> Span {
    tracing::info_span!(
        "dispatch.execute",
        "dispatch.id" = %dispatch_id,
        "item.id" = %item.id,
        "item.identifier" = %item.identifier,
        "dispatch.outcome" = tracing::field::Empty,
    )
}

/// Emit a label transition event scoped to the span.
pub fn record_label_transition(span: &Span, from: &str, to: &str) {
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "label_transition");
    });
}

pub fn record_outcome(span: &Span, outcome: &str) {
    span.record("dispatch.outcome", outcome);
}
