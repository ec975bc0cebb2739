use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. Used for record timestamps and hold expiry.
pub type Ms = i64;

pub const SLOT_TAKEN_REASON: &str = "Slot booked by someone else";
pub const HOLD_EXPIRED_REASON: &str = "Hold expired";

// ── Wall-clock time ──────────────────────────────────────────────

/// Minutes since midnight, written as `"HH:MM"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WallClock(u16);

impl WallClock {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self(hour * 60 + minute))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }
}

impl FromStr for WallClock {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (h, m) = s
            .split_once(':')
            .ok_or_else(|| format!("bad wall-clock time {s:?}: expected HH:MM"))?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(format!("bad wall-clock time {s:?}: expected HH:MM"));
        }
        let hour: u16 = h.parse().map_err(|_| format!("bad hour in {s:?}"))?;
        let minute: u16 = m.parse().map_err(|_| format!("bad minute in {s:?}"))?;
        Self::new(hour, minute).ok_or_else(|| format!("wall-clock time out of range: {s:?}"))
    }
}

impl TryFrom<String> for WallClock {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<WallClock> for String {
    fn from(t: WallClock) -> Self {
        t.to_string()
    }
}

impl fmt::Display for WallClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Half-open wall-clock range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: WallClock,
    pub end: WallClock,
}

impl TimeRange {
    pub fn new(start: WallClock, end: WallClock) -> Self {
        Self { start, end }
    }

    pub fn is_well_formed(&self) -> bool {
        self.start < self.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end.minutes().saturating_sub(self.start.minutes())
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

// ── Availability ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub enabled: bool,
    #[serde(default)]
    pub ranges: Vec<TimeRange>,
}

/// Weekly template, one entry per weekday starting Monday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityTemplate {
    pub days: [DayAvailability; 7],
}

impl AvailabilityTemplate {
    pub fn day(&self, weekday: Weekday) -> &DayAvailability {
        &self.days[weekday.num_days_from_monday() as usize]
    }

    pub fn day_mut(&mut self, weekday: Weekday) -> &mut DayAvailability {
        &mut self.days[weekday.num_days_from_monday() as usize]
    }

    /// Whether an enabled range on `weekday` fully contains `slot`.
    pub fn offers(&self, weekday: Weekday, slot: &TimeRange) -> bool {
        let day = self.day(weekday);
        day.enabled && day.ranges.iter().any(|r| r.contains(slot))
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Approved,
    Paid,
    Cancelled,
    Rejected,
}

impl Status {
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Paid | Status::Cancelled | Status::Rejected)
    }

    /// Pending or approved: holding the slot without having paid.
    pub fn is_hold(self) -> bool {
        matches!(self, Status::Pending | Status::Approved)
    }

    pub fn can_transition_to(self, next: Status) -> bool {
        match (self, next) {
            (Status::Pending, Status::Approved | Status::Rejected | Status::Cancelled | Status::Paid) => true,
            (Status::Approved, Status::Paid | Status::Cancelled) => true,
            (Status::Pending | Status::Approved, _) => false,
            (Status::Paid | Status::Cancelled | Status::Rejected, _) => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "pending",
            Status::Approved => "approved",
            Status::Paid => "paid",
            Status::Cancelled => "cancelled",
            Status::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// The bookable window a reservation competes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub teacher_id: Ulid,
    pub date: NaiveDate,
    pub slot: TimeRange,
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} {}", self.teacher_id, self.date, self.slot)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub student_id: Ulid,
    pub teacher_id: Ulid,
    pub course_id: Ulid,
    pub date: NaiveDate,
    pub day: Weekday,
    pub slot: TimeRange,
    pub payment_order_id: Option<String>,
    pub note: String,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub status: Status,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    /// A fresh `pending` hold. The weekday is derived from `date`.
    pub fn new_hold(
        id: Ulid,
        student_id: Ulid,
        teacher_id: Ulid,
        course_id: Ulid,
        date: NaiveDate,
        slot: TimeRange,
        note: String,
        now: Ms,
    ) -> Self {
        Self {
            id,
            student_id,
            teacher_id,
            course_id,
            date,
            day: date.weekday(),
            slot,
            payment_order_id: None,
            note,
            rejection_reason: None,
            cancellation_reason: None,
            status: Status::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot_key(&self) -> SlotKey {
        SlotKey {
            teacher_id: self.teacher_id,
            date: self.date,
            slot: self.slot,
        }
    }

    pub fn involves(&self, user_id: Ulid) -> bool {
        self.student_id == user_id || self.teacher_id == user_id
    }
}

/// All reservations competing for one slot, in creation order.
#[derive(Debug, Clone)]
pub struct SlotState {
    pub key: SlotKey,
    pub reservations: Vec<Reservation>,
}

impl SlotState {
    pub fn new(key: SlotKey) -> Self {
        Self {
            key,
            reservations: Vec::new(),
        }
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// The reservation that won this slot, if any.
    pub fn paid(&self) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.status == Status::Paid)
    }

    pub fn active_hold_of(&self, student_id: Ulid) -> Option<&Reservation> {
        self.reservations
            .iter()
            .find(|r| r.student_id == student_id && r.status.is_hold())
    }

    /// Insert keeping creation order; replays may arrive out of order after compaction.
    pub fn insert(&mut self, reservation: Reservation) {
        if let Some(existing) = self.get_mut(reservation.id) {
            *existing = reservation;
            return;
        }
        let pos = self
            .reservations
            .partition_point(|r| (r.created_at, r.id) < (reservation.created_at, reservation.id));
        self.reservations.insert(pos, reservation);
    }
}

// ── State machine transitions ────────────────────────────────────

/// A conditional change to one reservation. The store applies it only if
/// `admits` holds against the record as currently stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Approve,
    Reject { reason: String },
    Cancel { reason: String },
    /// Cancel an order-less pending hold created at or before `cutoff`.
    Expire { cutoff: Ms },
    AttachOrder { order_id: String },
    DetachOrder { order_id: String },
    Pay { order_id: String },
}

impl Transition {
    /// Status the record ends in when the transition applies.
    pub fn target(&self, current: Status) -> Status {
        match self {
            Transition::Approve => Status::Approved,
            Transition::Reject { .. } => Status::Rejected,
            Transition::Cancel { .. } | Transition::Expire { .. } => Status::Cancelled,
            Transition::Pay { .. } => Status::Paid,
            Transition::AttachOrder { .. } | Transition::DetachOrder { .. } => current,
        }
    }

    pub fn admits(&self, r: &Reservation) -> bool {
        match self {
            Transition::Approve => r.status.can_transition_to(Status::Approved),
            Transition::Reject { .. } => r.status.can_transition_to(Status::Rejected),
            Transition::Cancel { .. } => r.status.can_transition_to(Status::Cancelled),
            Transition::Expire { cutoff } => {
                r.status == Status::Pending && r.payment_order_id.is_none() && r.created_at <= *cutoff
            }
            Transition::AttachOrder { .. } => r.status.is_hold() && r.payment_order_id.is_none(),
            Transition::DetachOrder { order_id } => {
                r.status.is_hold() && r.payment_order_id.as_deref() == Some(order_id.as_str())
            }
            Transition::Pay { order_id } => {
                r.status.can_transition_to(Status::Paid)
                    && r.payment_order_id.as_deref() == Some(order_id.as_str())
            }
        }
    }

    pub fn into_event(self, id: Ulid, at: Ms) -> Event {
        match self {
            Transition::Approve => Event::HoldApproved { id, at },
            Transition::Reject { reason } => Event::HoldRejected { id, reason, at },
            Transition::Cancel { reason } => Event::ReservationCancelled { id, reason, at },
            Transition::Expire { .. } => Event::ReservationCancelled {
                id,
                reason: HOLD_EXPIRED_REASON.to_string(),
                at,
            },
            Transition::AttachOrder { order_id } => Event::PaymentOrderAttached { id, order_id, at },
            Transition::DetachOrder { .. } => Event::PaymentOrderDetached { id, at },
            Transition::Pay { order_id } => Event::ReservationPaid { id, order_id, at },
        }
    }
}

// ── Refunds ──────────────────────────────────────────────────────

/// A payment that succeeded for a reservation that could not be honored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundTicket {
    pub reservation_id: Ulid,
    pub order_id: String,
    pub requested_at: Ms,
}

// ── Journal events ───────────────────────────────────────────────

/// Journal record. One flat variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AvailabilityPublished {
        teacher_id: Ulid,
        template: AvailabilityTemplate,
    },
    HoldPlaced {
        reservation: Reservation,
    },
    HoldApproved {
        id: Ulid,
        at: Ms,
    },
    HoldRejected {
        id: Ulid,
        reason: String,
        at: Ms,
    },
    ReservationCancelled {
        id: Ulid,
        reason: String,
        at: Ms,
    },
    PaymentOrderAttached {
        id: Ulid,
        order_id: String,
        at: Ms,
    },
    PaymentOrderDetached {
        id: Ulid,
        at: Ms,
    },
    ReservationPaid {
        id: Ulid,
        order_id: String,
        at: Ms,
    },
    /// Full record, written by compaction.
    ReservationRestored {
        reservation: Reservation,
    },
    RefundRequested {
        ticket: RefundTicket,
    },
    RefundSettled {
        reservation_id: Ulid,
        at: Ms,
    },
}

impl Event {
    /// Id of the existing reservation a status event modifies.
    pub fn reservation_id(&self) -> Option<Ulid> {
        match self {
            Event::HoldApproved { id, .. }
            | Event::HoldRejected { id, .. }
            | Event::ReservationCancelled { id, .. }
            | Event::PaymentOrderAttached { id, .. }
            | Event::PaymentOrderDetached { id, .. }
            | Event::ReservationPaid { id, .. } => Some(*id),
            Event::HoldPlaced { reservation } | Event::ReservationRestored { reservation } => {
                Some(reservation.id)
            }
            Event::AvailabilityPublished { .. }
            | Event::RefundRequested { .. }
            | Event::RefundSettled { .. } => None,
        }
    }

    /// Apply a status event to its record. Other events are no-ops here.
    pub fn apply_to(&self, r: &mut Reservation) {
        match self {
            Event::HoldApproved { at, .. } => {
                r.status = Status::Approved;
                r.updated_at = *at;
            }
            Event::HoldRejected { reason, at, .. } => {
                r.status = Status::Rejected;
                r.rejection_reason = Some(reason.clone());
                r.updated_at = *at;
            }
            Event::ReservationCancelled { reason, at, .. } => {
                r.status = Status::Cancelled;
                r.cancellation_reason = Some(reason.clone());
                r.updated_at = *at;
            }
            Event::PaymentOrderAttached { order_id, at, .. } => {
                r.payment_order_id = Some(order_id.clone());
                r.updated_at = *at;
            }
            Event::PaymentOrderDetached { at, .. } => {
                r.payment_order_id = None;
                r.updated_at = *at;
            }
            Event::ReservationPaid { order_id, at, .. } => {
                r.status = Status::Paid;
                r.payment_order_id = Some(order_id.clone());
                r.updated_at = *at;
            }
            Event::AvailabilityPublished { .. }
            | Event::HoldPlaced { .. }
            | Event::ReservationRestored { .. }
            | Event::RefundRequested { .. }
            | Event::RefundSettled { .. } => {}
        }
    }
}

// ── Domain events for the notification collaborator ─────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    ReservationApproved {
        reservation_id: Ulid,
        student_id: Ulid,
        teacher_id: Ulid,
    },
    ReservationRejected {
        reservation_id: Ulid,
        student_id: Ulid,
        teacher_id: Ulid,
        reason: String,
    },
    ReservationPaid {
        reservation_id: Ulid,
        student_id: Ulid,
        teacher_id: Ulid,
        order_id: String,
    },
    ReservationCancelled {
        reservation_id: Ulid,
        student_id: Ulid,
        teacher_id: Ulid,
        reason: String,
    },
}

impl DomainEvent {
    /// Derive the notification for a reservation that just changed status.
    pub fn for_status_change(r: &Reservation) -> Option<Self> {
        let (reservation_id, student_id, teacher_id) = (r.id, r.student_id, r.teacher_id);
        match r.status {
            Status::Approved => Some(DomainEvent::ReservationApproved {
                reservation_id,
                student_id,
                teacher_id,
            }),
            Status::Rejected => Some(DomainEvent::ReservationRejected {
                reservation_id,
                student_id,
                teacher_id,
                reason: r.rejection_reason.clone().unwrap_or_default(),
            }),
            Status::Paid => Some(DomainEvent::ReservationPaid {
                reservation_id,
                student_id,
                teacher_id,
                order_id: r.payment_order_id.clone().unwrap_or_default(),
            }),
            Status::Cancelled => Some(DomainEvent::ReservationCancelled {
                reservation_id,
                student_id,
                teacher_id,
                reason: r.cancellation_reason.clone().unwrap_or_default(),
            }),
            Status::Pending => None,
        }
    }

    pub fn parties(&self) -> [Ulid; 2] {
        match self {
            DomainEvent::ReservationApproved { student_id, teacher_id, .. }
            | DomainEvent::ReservationRejected { student_id, teacher_id, .. }
            | DomainEvent::ReservationPaid { student_id, teacher_id, .. }
            | DomainEvent::ReservationCancelled { student_id, teacher_id, .. } => [*student_id, *teacher_id],
        }
    }
}

// ── Callers ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Learner,
    Instructor,
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "learner" | "student" => Ok(Role::Learner),
            "instructor" | "teacher" => Ok(Role::Instructor),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Caller identity as supplied by the identity collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Ulid,
    pub role: Role,
}

impl Actor {
    pub fn learner(user_id: Ulid) -> Self {
        Self { user_id, role: Role::Learner }
    }

    pub fn instructor(user_id: Ulid) -> Self {
        Self { user_id, role: Role::Instructor }
    }

    /// Whether this caller is the party `role` names on the reservation.
    pub fn is_party_to(&self, r: &Reservation) -> bool {
        match self.role {
            Role::Learner => r.student_id == self.user_id,
            Role::Instructor => r.teacher_id == self.user_id,
        }
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, per_page: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub per_page: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> WallClock {
        s.parse().unwrap()
    }

    fn range(a: &str, b: &str) -> TimeRange {
        TimeRange::new(t(a), t(b))
    }

    fn hold() -> Reservation {
        Reservation::new_hold(
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            Ulid::new(),
            NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            range("14:00", "15:00"),
            String::new(),
            1_000,
        )
    }

    #[test]
    fn wall_clock_parse_and_display() {
        assert_eq!(t("14:00").minutes(), 14 * 60);
        assert_eq!(t("9:05").to_string(), "09:05");
        assert_eq!(t("23:59").minutes(), 23 * 60 + 59);
        assert!("24:00".parse::<WallClock>().is_err());
        assert!("12:60".parse::<WallClock>().is_err());
        assert!("1200".parse::<WallClock>().is_err());
        assert!("12:5".parse::<WallClock>().is_err());
        assert!("ab:cd".parse::<WallClock>().is_err());
    }

    #[test]
    fn wall_clock_serde_uses_hh_mm() {
        let json = serde_json::to_string(&range("14:00", "15:30")).unwrap();
        assert_eq!(json, r#"{"start":"14:00","end":"15:30"}"#);
        let back: TimeRange = serde_json::from_str(&json).unwrap();
        assert_eq!(back, range("14:00", "15:30"));
        assert!(serde_json::from_str::<TimeRange>(r#"{"start":"25:00","end":"26:00"}"#).is_err());
    }

    #[test]
    fn range_overlap_and_containment() {
        let a = range("14:00", "15:00");
        assert!(a.overlaps(&range("14:30", "15:30")));
        assert!(!a.overlaps(&range("15:00", "16:00"))); // half-open
        assert!(range("13:00", "17:00").contains(&a));
        assert!(a.contains(&a));
        assert!(!a.contains(&range("13:30", "14:30")));
        assert_eq!(a.duration_minutes(), 60);
        assert!(!range("15:00", "14:00").is_well_formed());
    }

    #[test]
    fn status_transition_table() {
        use Status::*;
        assert!(Pending.can_transition_to(Approved));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Pending.can_transition_to(Paid));
        assert!(Approved.can_transition_to(Paid));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(!Approved.can_transition_to(Rejected));
        assert!(!Approved.can_transition_to(Approved));
        for terminal in [Paid, Cancelled, Rejected] {
            assert!(terminal.is_terminal());
            for next in [Pending, Approved, Paid, Cancelled, Rejected] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn pay_requires_matching_order() {
        let mut r = hold();
        let pay = Transition::Pay { order_id: "ord_1".into() };
        assert!(!pay.admits(&r));
        r.payment_order_id = Some("ord_2".into());
        assert!(!pay.admits(&r));
        r.payment_order_id = Some("ord_1".into());
        assert!(pay.admits(&r));
        r.status = Status::Rejected;
        assert!(!pay.admits(&r));
    }

    #[test]
    fn expire_only_order_less_pending_holds() {
        let mut r = hold();
        assert!(Transition::Expire { cutoff: 1_000 }.admits(&r));
        assert!(!Transition::Expire { cutoff: 999 }.admits(&r));
        r.payment_order_id = Some("ord".into());
        assert!(!Transition::Expire { cutoff: 5_000 }.admits(&r));
        r.payment_order_id = None;
        r.status = Status::Approved;
        assert!(!Transition::Expire { cutoff: 5_000 }.admits(&r));
    }

    #[test]
    fn apply_events_to_record() {
        let mut r = hold();
        Event::PaymentOrderAttached { id: r.id, order_id: "ord".into(), at: 2 }.apply_to(&mut r);
        assert_eq!(r.payment_order_id.as_deref(), Some("ord"));
        Event::ReservationPaid { id: r.id, order_id: "ord".into(), at: 3 }.apply_to(&mut r);
        assert_eq!(r.status, Status::Paid);
        assert_eq!(r.updated_at, 3);
    }

    #[test]
    fn slot_state_keeps_creation_order() {
        let first = hold();
        let mut second = first.clone();
        second.id = Ulid::new();
        second.created_at = 500;
        let mut slot = SlotState::new(first.slot_key());
        slot.insert(first.clone());
        slot.insert(second.clone());
        assert_eq!(slot.reservations[0].id, second.id);
        assert_eq!(slot.reservations[1].id, first.id);

        // re-inserting replaces instead of duplicating
        let mut updated = first.clone();
        updated.status = Status::Paid;
        slot.insert(updated);
        assert_eq!(slot.reservations.len(), 2);
        assert_eq!(slot.paid().map(|r| r.id), Some(first.id));
        assert_eq!(slot.active_hold_of(second.student_id).map(|r| r.id), Some(second.id));
    }

    #[test]
    fn template_offers_contained_slots_on_enabled_days() {
        let mut template = AvailabilityTemplate::default();
        let monday = template.day_mut(Weekday::Mon);
        monday.enabled = true;
        monday.ranges.push(range("09:00", "12:00"));

        assert!(template.offers(Weekday::Mon, &range("10:00", "11:00")));
        assert!(!template.offers(Weekday::Mon, &range("11:30", "12:30")));
        assert!(!template.offers(Weekday::Tue, &range("10:00", "11:00")));

        template.day_mut(Weekday::Mon).enabled = false;
        assert!(!template.offers(Weekday::Mon, &range("10:00", "11:00")));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::HoldPlaced { reservation: hold() };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
