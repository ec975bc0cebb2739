use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS;
use crate::model::*;
use crate::wal::Wal;

use super::conflict::check_admission;
use super::EngineError;

pub type SharedSlotState = Arc<RwLock<SlotState>>;

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Applied(Reservation),
    /// The transition's precondition failed against the stored record.
    Stale(Reservation),
    /// Promotion refused: another reservation on the slot is already paid.
    SlotTaken { current: Reservation, winner: Ulid },
}

/// Persistence boundary for reservations. Every mutation is a single-record
/// conditional write; implementations must evaluate the precondition and write
/// atomically with respect to other writers on the same slot.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, EngineError>;

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Reservation>, EngineError>;

    /// Insert a `pending` hold if the slot still admits one for its learner.
    async fn insert_hold(&self, reservation: Reservation) -> Result<Reservation, EngineError>;

    /// Apply `transition` only if it admits the record as currently stored.
    /// A `Pay` transition also fails if any other reservation on the slot is paid.
    async fn update(&self, id: Ulid, transition: Transition, at: Ms) -> Result<Update, EngineError>;

    /// All reservations on the slot, in creation order.
    async fn siblings(&self, key: &SlotKey) -> Result<Vec<Reservation>, EngineError>;

    /// Every reservation where `user_id` is the learner or the instructor.
    async fn list_for_user(&self, user_id: Ulid) -> Result<Vec<Reservation>, EngineError>;

    /// Ids of order-less pending holds created at or before `cutoff`.
    async fn stale_holds(&self, cutoff: Ms) -> Result<Vec<Ulid>, EngineError>;

    async fn record_refund(&self, ticket: RefundTicket) -> Result<(), EngineError>;

    async fn settle_refund(&self, reservation_id: Ulid, at: Ms) -> Result<(), EngineError>;

    async fn outstanding_refunds(&self) -> Result<Vec<RefundTicket>, EngineError>;
}

#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    async fn get_template(&self, teacher_id: Ulid) -> Result<Option<AvailabilityTemplate>, EngineError>;

    async fn put_template(&self, teacher_id: Ulid, template: AvailabilityTemplate) -> Result<(), EngineError>;
}

/// Everything the engine needs from storage.
pub trait Store: ReservationRepository + AvailabilityRepository {}

impl<T: ReservationRepository + AvailabilityRepository> Store for T {}

// ── Group-commit journal channel ─────────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the journal and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends.
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            commit_batch(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                if !batch.is_empty() {
                    commit_batch(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!("journal flush failed for batch of {}: {e}", batch.len());
    }
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even after an append error, so partially buffered bytes
    // don't leak into the next batch.
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events).and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the caller"),
    }
}

// ── Journal-backed store ─────────────────────────────────────────

/// Journal one event through the group-commit writer.
async fn journal(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

fn commit_aborted(e: tokio::task::JoinError) -> EngineError {
    EngineError::WalError(format!("journal commit aborted: {e}"))
}

/// Secondary indexes and store-wide records. Shared with in-flight commits.
#[derive(Default)]
struct Tables {
    /// Reservation id → slot it competes for.
    by_id: DashMap<Ulid, SlotKey>,
    /// Attached payment order id → reservation id.
    by_order: DashMap<String, Ulid>,
    /// Learner or instructor id → slots they take part in.
    party_slots: DashMap<Ulid, HashSet<SlotKey>>,
    templates: DashMap<Ulid, AvailabilityTemplate>,
    refunds: DashMap<Ulid, RefundTicket>,
}

impl Tables {
    /// Apply a reservation event to its slot and the indexes.
    fn apply(&self, slot: &mut SlotState, event: &Event) {
        match event {
            Event::HoldPlaced { reservation } | Event::ReservationRestored { reservation } => {
                self.by_id.insert(reservation.id, slot.key);
                if let Some(order_id) = &reservation.payment_order_id {
                    self.by_order.insert(order_id.clone(), reservation.id);
                }
                for party in [reservation.student_id, reservation.teacher_id] {
                    self.party_slots.entry(party).or_default().insert(slot.key);
                }
                slot.insert(reservation.clone());
            }
            other => {
                let Some(id) = other.reservation_id() else { return };
                let Some(record) = slot.get_mut(id) else { return };
                match other {
                    Event::PaymentOrderAttached { order_id, .. } => {
                        self.by_order.insert(order_id.clone(), id);
                    }
                    Event::PaymentOrderDetached { .. } => {
                        if let Some(order_id) = &record.payment_order_id {
                            self.by_order.remove(order_id);
                        }
                    }
                    _ => {}
                }
                other.apply_to(record);
            }
        }
    }

    fn apply_global(&self, event: &Event) {
        match event {
            Event::AvailabilityPublished { teacher_id, template } => {
                self.templates.insert(*teacher_id, template.clone());
            }
            Event::RefundRequested { ticket } => {
                self.refunds.insert(ticket.reservation_id, ticket.clone());
            }
            Event::RefundSettled { reservation_id, .. } => {
                self.refunds.remove(reservation_id);
            }
            _ => {}
        }
    }
}

/// In-memory reservation store made durable by the journal.
///
/// Each slot tuple owns one `RwLock`; a conditional update holds the slot's
/// write lock while it checks the precondition, journals the event, and
/// applies it. That lock is the row lock of this storage engine.
///
/// Journal-then-apply runs on a spawned task that owns the slot guard, so
/// dropping a caller mid-write (a disconnected client) never leaves a durable
/// event unapplied in memory.
pub struct WalStore {
    slots: DashMap<SlotKey, SharedSlotState>,
    tables: Arc<Tables>,
    /// Writers hold it shared; compaction holds it exclusively so its snapshot
    /// and the journal swap see the same state.
    gate: Arc<RwLock<()>>,
    wal_tx: mpsc::Sender<WalCommand>,
}

impl WalStore {
    /// Replay the journal at `path` and start its writer task.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (wal, replay) = Wal::open(path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            slots: DashMap::new(),
            tables: Arc::new(Tables::default()),
            gate: Arc::new(RwLock::new(())),
            wal_tx,
        };

        // We're the sole owner of every slot lock here, so try_write always
        // succeeds. Never block: this may run inside an async context.
        for event in &replay.events {
            match event {
                Event::HoldPlaced { reservation } | Event::ReservationRestored { reservation } => {
                    let slot = store.slot_entry(reservation.slot_key());
                    if let Ok(mut guard) = slot.try_write() {
                        store.tables.apply(&mut guard, event);
                    }
                }
                Event::AvailabilityPublished { .. } | Event::RefundRequested { .. } | Event::RefundSettled { .. } => {
                    store.tables.apply_global(event);
                }
                other => {
                    let slot = other.reservation_id().and_then(|id| store.slot_of(&id));
                    if let Some(slot) = slot
                        && let Ok(mut guard) = slot.try_write()
                    {
                        store.tables.apply(&mut guard, other);
                    }
                }
            }
        }

        tracing::info!(
            path = %path.display(),
            events = replay.events.len(),
            reservations = store.tables.by_id.len(),
            outstanding_refunds = store.tables.refunds.len(),
            "journal replayed"
        );
        Ok(store)
    }

    pub fn reservation_count(&self) -> usize {
        self.tables.by_id.len()
    }

    fn slot_entry(&self, key: SlotKey) -> SharedSlotState {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(RwLock::new(SlotState::new(key))))
            .value()
            .clone()
    }

    fn slot_of(&self, id: &Ulid) -> Option<SharedSlotState> {
        let key = self.tables.by_id.get(id).map(|k| *k.value())?;
        self.slots.get(&key).map(|s| s.value().clone())
    }

    /// Lookup reservation → slot, acquire the slot's write lock.
    async fn resolve_write(&self, id: Ulid) -> Result<OwnedRwLockWriteGuard<SlotState>, EngineError> {
        let slot = self.slot_of(&id).ok_or(EngineError::NotFound(id))?;
        Ok(slot.write_owned().await)
    }

    async fn enter(&self) -> OwnedRwLockReadGuard<()> {
        self.gate.clone().read_owned().await
    }

    /// Journal `event`, apply it to `slot`, and return record `id` as it now
    /// stands. Runs to completion even if the caller goes away.
    async fn commit(
        &self,
        gate: OwnedRwLockReadGuard<()>,
        mut slot: OwnedRwLockWriteGuard<SlotState>,
        event: Event,
        id: Ulid,
    ) -> Result<Reservation, EngineError> {
        let tables = self.tables.clone();
        let wal_tx = self.wal_tx.clone();
        tokio::spawn(async move {
            let _gate = gate;
            journal(&wal_tx, &event).await?;
            tables.apply(&mut slot, &event);
            slot.get(id).cloned().ok_or(EngineError::NotFound(id))
        })
        .await
        .map_err(commit_aborted)?
    }

    async fn commit_global(&self, event: Event) -> Result<(), EngineError> {
        let gate = self.enter().await;
        let tables = self.tables.clone();
        let wal_tx = self.wal_tx.clone();
        tokio::spawn(async move {
            let _gate = gate;
            journal(&wal_tx, &event).await?;
            tables.apply_global(&event);
            Ok::<(), EngineError>(())
        })
        .await
        .map_err(commit_aborted)?
    }

    fn all_slots(&self) -> Vec<SharedSlotState> {
        self.slots.iter().map(|e| e.value().clone()).collect()
    }

    /// Rewrite the journal with only the events needed to recreate current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        let _gate = self.gate.write().await;
        let mut events: Vec<Event> = self
            .tables
            .templates
            .iter()
            .map(|e| Event::AvailabilityPublished {
                teacher_id: *e.key(),
                template: e.value().clone(),
            })
            .collect();

        for slot in self.all_slots() {
            let guard = slot.read().await;
            events.extend(
                guard
                    .reservations
                    .iter()
                    .map(|r| Event::ReservationRestored { reservation: r.clone() }),
            );
        }

        events.extend(
            self.tables
                .refunds
                .iter()
                .map(|e| Event::RefundRequested { ticket: e.value().clone() }),
        );

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

#[async_trait]
impl ReservationRepository for WalStore {
    async fn get(&self, id: Ulid) -> Result<Option<Reservation>, EngineError> {
        let Some(slot) = self.slot_of(&id) else {
            return Ok(None);
        };
        let guard = slot.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn find_by_order(&self, order_id: &str) -> Result<Option<Reservation>, EngineError> {
        let Some(id) = self.tables.by_order.get(order_id).map(|e| *e.value()) else {
            return Ok(None);
        };
        self.get(id).await
    }

    async fn insert_hold(&self, reservation: Reservation) -> Result<Reservation, EngineError> {
        if self.tables.by_id.len() >= MAX_RESERVATIONS {
            return Err(EngineError::LimitExceeded("too many reservations"));
        }
        let gate = self.enter().await;
        let guard = self.slot_entry(reservation.slot_key()).write_owned().await;

        check_admission(&guard, reservation.student_id)?;

        let id = reservation.id;
        self.commit(gate, guard, Event::HoldPlaced { reservation }, id).await
    }

    async fn update(&self, id: Ulid, transition: Transition, at: Ms) -> Result<Update, EngineError> {
        let gate = self.enter().await;
        let guard = self.resolve_write(id).await?;
        let current = guard.get(id).cloned().ok_or(EngineError::NotFound(id))?;

        if !transition.admits(&current) {
            return Ok(Update::Stale(current));
        }
        if matches!(transition, Transition::Pay { .. })
            && let Some(winner) = guard.paid()
        {
            return Ok(Update::SlotTaken {
                winner: winner.id,
                current,
            });
        }
        if let Transition::AttachOrder { order_id } = &transition
            && self.tables.by_order.get(order_id).is_some_and(|owner| *owner.value() != id)
        {
            return Err(EngineError::Validation(format!(
                "payment order {order_id} belongs to another reservation"
            )));
        }

        let event = transition.into_event(id, at);
        self.commit(gate, guard, event, id).await.map(Update::Applied)
    }

    async fn siblings(&self, key: &SlotKey) -> Result<Vec<Reservation>, EngineError> {
        let Some(slot) = self.slots.get(key).map(|s| s.value().clone()) else {
            return Ok(Vec::new());
        };
        let guard = slot.read().await;
        Ok(guard.reservations.clone())
    }

    async fn list_for_user(&self, user_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let keys: Vec<SlotKey> = self
            .tables
            .party_slots
            .get(&user_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default();

        let mut out = Vec::new();
        for key in keys {
            let Some(slot) = self.slots.get(&key).map(|s| s.value().clone()) else {
                continue;
            };
            let guard = slot.read().await;
            out.extend(guard.reservations.iter().filter(|r| r.involves(user_id)).cloned());
        }
        Ok(out)
    }

    async fn stale_holds(&self, cutoff: Ms) -> Result<Vec<Ulid>, EngineError> {
        let expire = Transition::Expire { cutoff };
        let mut stale = Vec::new();
        for slot in self.all_slots() {
            // Contended slots are being written right now; the next sweep gets them.
            if let Ok(guard) = slot.try_read() {
                stale.extend(guard.reservations.iter().filter(|r| expire.admits(r)).map(|r| r.id));
            }
        }
        Ok(stale)
    }

    async fn record_refund(&self, ticket: RefundTicket) -> Result<(), EngineError> {
        self.commit_global(Event::RefundRequested { ticket }).await
    }

    async fn settle_refund(&self, reservation_id: Ulid, at: Ms) -> Result<(), EngineError> {
        if !self.tables.refunds.contains_key(&reservation_id) {
            return Ok(());
        }
        self.commit_global(Event::RefundSettled { reservation_id, at }).await
    }

    async fn outstanding_refunds(&self) -> Result<Vec<RefundTicket>, EngineError> {
        let mut tickets: Vec<RefundTicket> = self.tables.refunds.iter().map(|e| e.value().clone()).collect();
        tickets.sort_by_key(|t| t.requested_at);
        Ok(tickets)
    }
}

#[async_trait]
impl AvailabilityRepository for WalStore {
    async fn get_template(&self, teacher_id: Ulid) -> Result<Option<AvailabilityTemplate>, EngineError> {
        Ok(self.tables.templates.get(&teacher_id).map(|e| e.value().clone()))
    }

    async fn put_template(&self, teacher_id: Ulid, template: AvailabilityTemplate) -> Result<(), EngineError> {
        self.commit_global(Event::AvailabilityPublished { teacher_id, template }).await
    }
}
