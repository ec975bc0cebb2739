use std::cmp::Reverse;

use chrono::NaiveDate;
use ulid::Ulid;

use crate::limits::MAX_PER_PAGE;
use crate::model::*;

use super::{Engine, EngineError, ReservationRepository};

impl Engine {
    /// A single reservation, visible only to its learner and instructor.
    pub async fn get(&self, id: Ulid, actor: Actor) -> Result<Reservation, EngineError> {
        let r = self.load(id).await?;
        if !actor.is_party_to(&r) {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: id,
            });
        }
        Ok(r)
    }

    /// Reservations where the caller takes part in the role they act as.
    async fn own_reservations(&self, actor: Actor) -> Result<Vec<Reservation>, EngineError> {
        let mut all = self.store.list_for_user(actor.user_id).await?;
        all.retain(|r| actor.is_party_to(r));
        Ok(all)
    }

    /// Paid sessions on or after `today`, soonest first.
    pub async fn upcoming(&self, actor: Actor, today: NaiveDate) -> Result<Vec<Reservation>, EngineError> {
        let mut items = self.own_reservations(actor).await?;
        items.retain(|r| r.status == Status::Paid && r.date >= today);
        items.sort_by_key(|r| (r.date, r.slot.start, r.id));
        Ok(items)
    }

    /// Every reservation of the caller, newest date first, optionally filtered by status.
    pub async fn history(
        &self,
        actor: Actor,
        status: Option<Status>,
        page: Page,
    ) -> Result<Paged<Reservation>, EngineError> {
        if page.page == 0 {
            return Err(EngineError::Validation("page is 1-based".into()));
        }
        if page.per_page == 0 {
            return Err(EngineError::Validation("per_page must be positive".into()));
        }
        if page.per_page > MAX_PER_PAGE {
            return Err(EngineError::LimitExceeded("per_page too large"));
        }

        let mut items = self.own_reservations(actor).await?;
        if let Some(status) = status {
            items.retain(|r| r.status == status);
        }
        items.sort_by_key(|r| Reverse((r.date, r.slot.start, r.created_at, r.id)));

        let total = items.len();
        let skip = (page.page as usize - 1).saturating_mul(page.per_page as usize);
        let items = items.into_iter().skip(skip).take(page.per_page as usize).collect();
        Ok(Paged {
            items,
            total,
            page: page.page,
            per_page: page.per_page,
        })
    }

    /// An instructor's requests awaiting a decision, oldest first.
    pub async fn pending_queue(&self, actor: Actor) -> Result<Vec<Reservation>, EngineError> {
        if actor.role != Role::Instructor {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: actor.user_id,
            });
        }
        let mut items = self.own_reservations(actor).await?;
        items.retain(|r| r.status == Status::Pending);
        items.sort_by_key(|r| (r.created_at, r.id));
        Ok(items)
    }
}
