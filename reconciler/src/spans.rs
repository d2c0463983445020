//! Span constructors shared by the reconciler's hot paths.

use tracing::{debug_span, info_span, Span};

use typhoon_types::{BlockRange, EventKey};

/// One reconciliation cycle over `range`.
pub fn cycle_span(range: &BlockRange) -> Span {
    info_span!("reconcile_cycle", from = range.from, to = range.to)
}

/// Projection of a single event.
pub fn projection_span(key: &EventKey, kind: &str) -> Span {
    debug_span!("project", event = %key, kind = %kind)
}
