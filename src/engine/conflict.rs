use chrono::{Datelike, NaiveDate};
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{AvailabilityRepository, Engine, EngineError, ReservationRepository};

pub fn now_ms() -> Ms {
    chrono::Utc::now().timestamp_millis()
}

/// A learner's request to hold one slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HoldRequest {
    pub teacher_id: Ulid,
    pub course_id: Ulid,
    pub date: NaiveDate,
    pub slot: TimeRange,
    #[serde(default)]
    pub note: String,
}

pub(crate) fn validate_slot(slot: &TimeRange) -> Result<(), EngineError> {
    if !slot.is_well_formed() {
        return Err(EngineError::Validation(format!("slot {slot} must start before it ends")));
    }
    Ok(())
}

/// Trimmed, non-empty, bounded reason text.
pub(crate) fn validate_reason(reason: &str) -> Result<String, EngineError> {
    let reason = reason.trim();
    if reason.is_empty() {
        return Err(EngineError::Validation("a reason is required".into()));
    }
    if reason.len() > MAX_REASON_LEN {
        return Err(EngineError::LimitExceeded("reason too long"));
    }
    Ok(reason.to_string())
}

/// Admission policy for a new hold, evaluated under the slot's write lock.
///
/// A paid slot admits nobody. Otherwise any learner may hold it, except one
/// who already has a live hold on the same slot.
pub(crate) fn check_admission(slot: &SlotState, student_id: Ulid) -> Result<(), EngineError> {
    if let Some(winner) = slot.paid() {
        return Err(EngineError::SlotTaken { winner: winner.id });
    }
    if let Some(existing) = slot.active_hold_of(student_id) {
        return Err(EngineError::DuplicateHold { existing: existing.id });
    }
    Ok(())
}

impl Engine {
    pub async fn create_hold(&self, actor: Actor, req: HoldRequest) -> Result<Reservation, EngineError> {
        if actor.role != Role::Learner {
            return Err(EngineError::Forbidden {
                actor: actor.user_id,
                target: req.teacher_id,
            });
        }
        validate_slot(&req.slot)?;
        if req.note.len() > MAX_NOTE_LEN {
            return Err(EngineError::LimitExceeded("note too long"));
        }

        let offered = self
            .store
            .get_template(req.teacher_id)
            .await?
            .is_some_and(|t| t.offers(req.date.weekday(), &req.slot));
        if !offered {
            return Err(EngineError::Validation("slot outside published availability".into()));
        }

        let hold = Reservation::new_hold(
            Ulid::new(),
            actor.user_id,
            req.teacher_id,
            req.course_id,
            req.date,
            req.slot,
            req.note,
            now_ms(),
        );

        match self.store.insert_hold(hold).await {
            Ok(r) => {
                metrics::counter!(crate::observability::HOLDS_CREATED_TOTAL).increment(1);
                tracing::info!(reservation = %r.id, slot = %r.slot_key(), student = %r.student_id, "hold placed");
                Ok(r)
            }
            Err(e) => {
                let reason = match &e {
                    EngineError::DuplicateHold { .. } => "duplicate",
                    EngineError::SlotTaken { .. } => "slot_taken",
                    _ => "other",
                };
                metrics::counter!(crate::observability::HOLDS_REFUSED_TOTAL, "reason" => reason).increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot_with(statuses: &[(Ulid, Status)]) -> SlotState {
        let date = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let range = TimeRange::new("14:00".parse().unwrap(), "15:00".parse().unwrap());
        let teacher = Ulid::new();
        let mut slot = SlotState::new(SlotKey {
            teacher_id: teacher,
            date,
            slot: range,
        });
        for (i, (student, status)) in statuses.iter().enumerate() {
            let mut r = Reservation::new_hold(
                Ulid::new(),
                *student,
                teacher,
                Ulid::new(),
                date,
                range,
                String::new(),
                i as Ms,
            );
            r.status = *status;
            slot.insert(r);
        }
        slot
    }

    #[test]
    fn other_learners_are_admitted_alongside_holds() {
        let slot = slot_with(&[(Ulid::new(), Status::Pending), (Ulid::new(), Status::Approved)]);
        assert!(check_admission(&slot, Ulid::new()).is_ok());
    }

    #[test]
    fn paid_slot_refuses_everyone() {
        let student = Ulid::new();
        let slot = slot_with(&[(Ulid::new(), Status::Paid)]);
        assert!(matches!(check_admission(&slot, student), Err(EngineError::SlotTaken { .. })));
    }

    #[test]
    fn same_learner_live_hold_is_duplicate() {
        let student = Ulid::new();
        let slot = slot_with(&[(student, Status::Approved)]);
        assert!(matches!(
            check_admission(&slot, student),
            Err(EngineError::DuplicateHold { .. })
        ));
    }

    #[test]
    fn terminal_history_does_not_block_rebooking() {
        let student = Ulid::new();
        let slot = slot_with(&[(student, Status::Cancelled), (student, Status::Rejected)]);
        assert!(check_admission(&slot, student).is_ok());
    }

    #[test]
    fn reasons_are_trimmed_and_required() {
        assert_eq!(validate_reason("  changed plans ").unwrap(), "changed plans");
        assert!(matches!(validate_reason("   "), Err(EngineError::Validation(_))));
        let long = "x".repeat(MAX_REASON_LEN + 1);
        assert!(matches!(validate_reason(&long), Err(EngineError::LimitExceeded(_))));
    }
}
