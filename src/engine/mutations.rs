use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{now_ms, validate_reason};
use super::{Engine, EngineError, ReservationRepository, Update};

impl Engine {
    /// Reservation `id`, provided `actor` is its instructor.
    async fn owned_by_instructor(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let r = self.load(id).await?;
        if actor.role != Role::Instructor || !actor.is_party_to(&r) {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: id,
            });
        }
        Ok(r)
    }

    /// Reservation `id`, provided `actor` is the learner who made it.
    pub async fn owned_by_learner(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let r = self.load(id).await?;
        if actor.role != Role::Learner || !actor.is_party_to(&r) {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: id,
            });
        }
        Ok(r)
    }

    pub async fn approve(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        self.owned_by_instructor(id, actor).await?;
        self.apply_transition(id, Transition::Approve).await
    }

    pub async fn reject(&self, id: Ulid, actor: Actor, reason: &str) -> Result<Reservation, EngineError> {
        let reason = validate_reason(reason)?;
        self.owned_by_instructor(id, actor).await?;
        self.apply_transition(id, Transition::Reject { reason }).await
    }

    pub async fn cancel(&self, id: Ulid, actor: Actor, reason: &str) -> Result<Reservation, EngineError> {
        let reason = validate_reason(reason)?;
        self.owned_by_learner(id, actor).await?;
        self.apply_transition(id, Transition::Cancel { reason }).await
    }

    /// Attach a payment order. Re-attaching the same order is a no-op; a
    /// different order on a hold that already has one is a conflict.
    pub async fn attach_payment_order(&self, id: Ulid, order_id: &str) -> Result<Reservation, EngineError> {
        let order_id = order_id.trim();
        if order_id.is_empty() {
            return Err(EngineError::Validation("payment order id is required".into()));
        }
        if order_id.len() > MAX_ORDER_ID_LEN {
            return Err(EngineError::LimitExceeded("payment order id too long"));
        }

        let transition = Transition::AttachOrder {
            order_id: order_id.to_string(),
        };
        match self.store.update(id, transition, now_ms()).await? {
            Update::Applied(r) => {
                tracing::info!(reservation = %id, order_id, "payment order attached");
                Ok(r)
            }
            Update::Stale(current) if current.status.is_hold() => match &current.payment_order_id {
                Some(attached) if attached == order_id => Ok(current),
                Some(attached) => Err(EngineError::Conflict {
                    id,
                    attached: attached.clone(),
                }),
                None => Err(EngineError::InvalidTransition {
                    id,
                    from: current.status,
                    to: current.status,
                }),
            },
            Update::Stale(current) => Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: Status::Paid,
            }),
            Update::SlotTaken { winner, .. } => Err(EngineError::SlotTaken { winner }),
        }
    }

    /// Open a checkout session for the learner's hold and attach its order.
    /// A hold that already carries an order gets it back unchanged.
    pub async fn begin_payment(&self, id: Ulid, actor: Actor, amount_cents: u64) -> Result<Reservation, EngineError> {
        if amount_cents == 0 {
            return Err(EngineError::Validation("amount must be positive".into()));
        }
        let current = self.owned_by_learner(id, actor).await?;
        if !current.status.is_hold() {
            return Err(EngineError::InvalidTransition {
                id,
                from: current.status,
                to: Status::Paid,
            });
        }
        if current.payment_order_id.is_some() {
            return Ok(current);
        }

        let order_id = self
            .gateway
            .create_payment_session(id, amount_cents)
            .await
            .map_err(|e| EngineError::Gateway(e.to_string()))?;

        match self.attach_payment_order(id, &order_id).await {
            // A concurrent checkout attached its own order first; hand that one back.
            Err(EngineError::Conflict { .. }) => self.load(id).await,
            other => other,
        }
    }

    /// Cancel every order-less `pending` hold older than the hold TTL.
    /// Returns how many were expired.
    pub async fn expire_stale_holds(&self, now: Ms) -> Result<usize, EngineError> {
        let cutoff = now - self.hold_ttl_ms;
        let mut expired = 0;
        for id in self.store.stale_holds(cutoff).await? {
            // Conditional on still being pending with no order.
            match self.store.update(id, Transition::Expire { cutoff }, now).await {
                Ok(Update::Applied(r)) => {
                    tracing::info!(reservation = %id, slot = %r.slot_key(), "hold expired");
                    self.publish(&r);
                    expired += 1;
                }
                Ok(_) => tracing::debug!("sweeper skip {id}: no longer eligible"),
                Err(e) => tracing::debug!("sweeper skip {id}: {e}"),
            }
        }
        if expired > 0 {
            metrics::counter!(crate::observability::HOLDS_EXPIRED_TOTAL).increment(expired as u64);
        }
        Ok(expired)
    }
}
