use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::model::Transition;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: HTTP requests served. Labels: route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "tutorslot_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "tutorslot_http_request_duration_seconds";

// ── Reservation lifecycle ───────────────────────────────────────

/// Counter: holds admitted as `pending`.
pub const HOLDS_CREATED_TOTAL: &str = "tutorslot_holds_created_total";

/// Counter: hold requests refused at admission. Labels: reason.
pub const HOLDS_REFUSED_TOTAL: &str = "tutorslot_holds_refused_total";

/// Counter: applied state-machine transitions. Labels: transition.
pub const TRANSITIONS_TOTAL: &str = "tutorslot_transitions_total";

/// Counter: payment signals processed. Labels: outcome.
pub const PAYMENTS_TOTAL: &str = "tutorslot_payments_total";

/// Counter: sibling holds cancelled because their slot was paid by someone else.
pub const CASCADE_CANCELLED_TOTAL: &str = "tutorslot_cascade_cancelled_total";

/// Counter: holds cancelled by the sweeper.
pub const HOLDS_EXPIRED_TOTAL: &str = "tutorslot_holds_expired_total";

/// Counter: refunds requested for payments that could not be honored.
pub const REFUNDS_REQUESTED_TOTAL: &str = "tutorslot_refunds_requested_total";

/// Counter: refunds acknowledged by the payment gateway.
pub const REFUNDS_SETTLED_TOTAL: &str = "tutorslot_refunds_settled_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Histogram: journal group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "tutorslot_wal_flush_duration_seconds";

/// Histogram: journal group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "tutorslot_wal_flush_batch_size";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a transition, used on `TRANSITIONS_TOTAL`.
pub fn transition_label(transition: &Transition) -> &'static str {
    match transition {
        Transition::Approve => "approve",
        Transition::Reject { .. } => "reject",
        Transition::Cancel { .. } => "cancel",
        Transition::Expire { .. } => "expire",
        Transition::AttachOrder { .. } => "attach_order",
        Transition::DetachOrder { .. } => "detach_order",
        Transition::Pay { .. } => "pay",
    }
}
