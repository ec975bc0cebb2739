mod availability;
mod conflict;
mod error;
mod mutations;
mod payment;
mod queries;
mod store;

pub use availability::{subtract_ranges, validate_template};
pub use conflict::{now_ms, HoldRequest};
pub use error::EngineError;
pub use payment::PaymentOutcome;
pub use store::{AvailabilityRepository, ReservationRepository, Store, Update, WalStore};

use std::sync::Arc;

use ulid::Ulid;

use crate::gateway::PaymentGateway;
use crate::limits::DEFAULT_HOLD_TTL_MS;
use crate::model::*;
use crate::notify::NotifyHub;

/// The reservation engine: state machine, conflict resolution and payment
/// confirmation on top of a [`Store`].
///
/// The engine holds no locks of its own. Every write it issues is a single
/// conditional update, so concurrent request handlers can share one instance.
pub struct Engine {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    pub notify: Arc<NotifyHub>,
    hold_ttl_ms: Ms,
}

impl Engine {
    pub fn new(store: Arc<dyn Store>, gateway: Arc<dyn PaymentGateway>, notify: Arc<NotifyHub>) -> Self {
        Self {
            store,
            gateway,
            notify,
            hold_ttl_ms: DEFAULT_HOLD_TTL_MS,
        }
    }

    pub fn with_hold_ttl(mut self, hold_ttl_ms: Ms) -> Self {
        self.hold_ttl_ms = hold_ttl_ms;
        self
    }

    pub fn hold_ttl_ms(&self) -> Ms {
        self.hold_ttl_ms
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    pub(super) async fn load(&self, id: Ulid) -> Result<Reservation, EngineError> {
        self.store.get(id).await?.ok_or(EngineError::NotFound(id))
    }

    /// Fan a status change out to both parties. Never fails the caller.
    pub(super) fn publish(&self, r: &Reservation) {
        if let Some(event) = DomainEvent::for_status_change(r) {
            self.notify.publish(&event);
        }
    }

    /// Run one conditional update and translate the outcome into the
    /// caller-facing result. Status changes are published on success.
    pub(super) async fn apply_transition(&self, id: Ulid, transition: Transition) -> Result<Reservation, EngineError> {
        let label = crate::observability::transition_label(&transition);
        match self.store.update(id, transition.clone(), now_ms()).await? {
            Update::Applied(r) => {
                metrics::counter!(crate::observability::TRANSITIONS_TOTAL, "transition" => label).increment(1);
                tracing::info!(reservation = %r.id, status = %r.status, "{label} applied");
                self.publish(&r);
                Ok(r)
            }
            Update::Stale(current) => Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: transition.target(current.status),
            }),
            Update::SlotTaken { winner, .. } => Err(EngineError::SlotTaken { winner }),
        }
    }
}
