use serde::Serialize;
use ulid::Ulid;

use crate::gateway::PaymentResult;
use crate::model::*;
use crate::observability::{
    CASCADE_CANCELLED_TOTAL, PAYMENTS_TOTAL, REFUNDS_REQUESTED_TOTAL, REFUNDS_SETTLED_TOTAL,
};

use super::conflict::now_ms;
use super::{Engine, EngineError, ReservationRepository, Update};

/// Result of processing a payment signal that did not fail the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// The reservation is now paid; `cancelled` lists the siblings it displaced.
    Confirmed {
        reservation: Reservation,
        cancelled: Vec<Ulid>,
    },
    /// The reservation was already paid. Nothing changed.
    AlreadyFinalized { reservation: Reservation },
    /// The payment failed; the order was detached so checkout can be retried.
    Declined { reservation: Reservation },
}

impl Engine {
    /// Process a verified payment signal for `order_id`.
    ///
    /// Success promotes the reservation with one conditional update, and only
    /// after that write is durable are the slot's other holds cancelled, each
    /// with its own conditional update. A success that arrives for a
    /// reservation that can no longer be paid is refunded and reported as
    /// [`EngineError::PaymentOnRejectedReservation`].
    pub async fn confirm_payment(&self, order_id: &str, result: PaymentResult) -> Result<PaymentOutcome, EngineError> {
        let target = self
            .store
            .find_by_order(order_id)
            .await?
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;
        let id = target.id;
        let now = now_ms();

        if result == PaymentResult::Failed {
            return self.decline(id, order_id, now).await;
        }

        let promotion = Transition::Pay {
            order_id: order_id.to_string(),
        };
        match self.store.update(id, promotion, now).await? {
            Update::Applied(paid) => {
                metrics::counter!(PAYMENTS_TOTAL, "outcome" => "confirmed").increment(1);
                tracing::info!(reservation = %id, order_id, slot = %paid.slot_key(), "reservation paid");
                self.publish(&paid);
                let cancelled = self.cascade(&paid, now).await?;
                Ok(PaymentOutcome::Confirmed {
                    reservation: paid,
                    cancelled,
                })
            }
            Update::Stale(current) if current.status == Status::Paid => {
                metrics::counter!(PAYMENTS_TOTAL, "outcome" => "already_finalized").increment(1);
                tracing::debug!(reservation = %id, order_id, "duplicate payment signal ignored");
                Ok(PaymentOutcome::AlreadyFinalized { reservation: current })
            }
            Update::Stale(current) => {
                // Cancelled or rejected before the money arrived, or the order
                // was swapped out underneath us. Never resurrect.
                metrics::counter!(PAYMENTS_TOTAL, "outcome" => "refunded").increment(1);
                self.escalate_refund(&current, order_id, now).await?;
                Err(EngineError::PaymentOnRejectedReservation {
                    id,
                    order_id: order_id.to_string(),
                    status: current.status,
                })
            }
            Update::SlotTaken { current, winner } => {
                // Lost the race to a sibling that paid first; finish the cascade
                // for this record ourselves.
                metrics::counter!(PAYMENTS_TOTAL, "outcome" => "refunded").increment(1);
                tracing::warn!(reservation = %id, %winner, order_id, "payment lost slot to a concurrent payment");
                let status = match self.cancel_sibling(id, now).await {
                    Some(cancelled) => cancelled.status,
                    None => self.load(id).await.map(|r| r.status).unwrap_or(current.status),
                };
                self.escalate_refund(&current, order_id, now).await?;
                Err(EngineError::PaymentOnRejectedReservation {
                    id,
                    order_id: order_id.to_string(),
                    status,
                })
            }
        }
    }

    async fn decline(&self, id: Ulid, order_id: &str, now: Ms) -> Result<PaymentOutcome, EngineError> {
        let detach = Transition::DetachOrder {
            order_id: order_id.to_string(),
        };
        let outcome = match self.store.update(id, detach, now).await? {
            Update::Applied(reservation) => {
                tracing::info!(reservation = %id, order_id, "payment declined; order detached");
                PaymentOutcome::Declined { reservation }
            }
            Update::Stale(current) if current.status == Status::Paid => {
                tracing::warn!(reservation = %id, order_id, "failure signal for a paid reservation ignored");
                PaymentOutcome::AlreadyFinalized { reservation: current }
            }
            Update::Stale(reservation) | Update::SlotTaken { current: reservation, .. } => {
                PaymentOutcome::Declined { reservation }
            }
        };
        metrics::counter!(PAYMENTS_TOTAL, "outcome" => "declined").increment(1);
        Ok(outcome)
    }

    /// Cancel every other live hold on the winner's exact slot.
    async fn cascade(&self, winner: &Reservation, now: Ms) -> Result<Vec<Ulid>, EngineError> {
        let siblings = self.store.siblings(&winner.slot_key()).await?;
        let mut cancelled = Vec::new();
        for sibling in siblings.iter().filter(|r| r.id != winner.id && r.status.is_hold()) {
            if let Some(r) = self.cancel_sibling(sibling.id, now).await {
                cancelled.push(r.id);
            }
        }
        if !cancelled.is_empty() {
            metrics::counter!(CASCADE_CANCELLED_TOTAL).increment(cancelled.len() as u64);
            tracing::info!(winner = %winner.id, cancelled = cancelled.len(), "cascade cancelled sibling holds");
        }
        Ok(cancelled)
    }

    /// Conditional cancel with the slot-taken reason. Best effort: a sibling
    /// that moved on (including one that just got paid) is left alone.
    async fn cancel_sibling(&self, id: Ulid, now: Ms) -> Option<Reservation> {
        let cancel = Transition::Cancel {
            reason: SLOT_TAKEN_REASON.to_string(),
        };
        match self.store.update(id, cancel, now).await {
            Ok(Update::Applied(r)) => {
                self.publish(&r);
                Some(r)
            }
            Ok(_) => {
                tracing::debug!("cascade skip {id}: no longer a hold");
                None
            }
            Err(e) => {
                tracing::warn!("cascade failed for {id}: {e}");
                None
            }
        }
    }

    /// Journal a refund ticket, then ask the gateway to refund. A failed
    /// gateway call leaves the ticket for the sweeper to retry.
    ///
    /// If the ticket cannot be journaled the refund is attempted anyway; when
    /// that fails too, the journal error is returned so the payment signal is
    /// redelivered and lands back here. Nothing is reported as refunded that
    /// is not either settled or on the ledger.
    async fn escalate_refund(&self, r: &Reservation, order_id: &str, now: Ms) -> Result<(), EngineError> {
        tracing::warn!(
            reservation = %r.id,
            order_id,
            status = %r.status,
            "reconciliation: payment captured for a reservation that cannot be paid; refunding"
        );
        metrics::counter!(REFUNDS_REQUESTED_TOTAL).increment(1);
        let ticket = RefundTicket {
            reservation_id: r.id,
            order_id: order_id.to_string(),
            requested_at: now,
        };
        match self.store.record_refund(ticket.clone()).await {
            Ok(()) => {
                self.settle(&ticket).await;
                Ok(())
            }
            Err(journal_err) => {
                tracing::error!(reservation = %r.id, order_id, "failed to journal refund ticket: {journal_err}");
                if self.settle(&ticket).await {
                    Ok(())
                } else {
                    Err(journal_err)
                }
            }
        }
    }

    async fn settle(&self, ticket: &RefundTicket) -> bool {
        if let Err(e) = self.gateway.refund(ticket.reservation_id, &ticket.order_id).await {
            tracing::warn!(
                reservation = %ticket.reservation_id,
                order_id = %ticket.order_id,
                "refund failed, will retry: {e}"
            );
            return false;
        }
        metrics::counter!(REFUNDS_SETTLED_TOTAL).increment(1);
        tracing::info!(reservation = %ticket.reservation_id, order_id = %ticket.order_id, "refund settled");
        if let Err(e) = self.store.settle_refund(ticket.reservation_id, now_ms()).await {
            tracing::error!(reservation = %ticket.reservation_id, "failed to journal refund settlement: {e}");
        }
        true
    }

    /// Retry every outstanding refund. Returns how many settled.
    pub async fn retry_refunds(&self) -> Result<usize, EngineError> {
        let mut settled = 0;
        for ticket in self.store.outstanding_refunds().await? {
            if self.settle(&ticket).await {
                settled += 1;
            }
        }
        Ok(settled)
    }
}
