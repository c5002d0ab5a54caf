mod conflict;
mod error;
mod mutations;
mod occupancy;
mod queries;
mod store;
mod user_index;

pub use conflict::now_ms;
pub use error::EngineError;
pub use store::{EventLog, MemoryLog, WalLog};

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{info, warn};
use ulid::Ulid;

use crate::model::*;

pub type SharedEquipmentState = Arc<RwLock<EquipmentState>>;

/// Engine-wide behavior switches.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    pub overlap: OverlapPolicy,
    /// Upper bound on waiting for locks before an operation gives up.
    pub op_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            overlap: OverlapPolicy::Inclusive,
            op_timeout: Duration::from_secs(5),
        }
    }
}

/// The booking engine: equipment registry plus reservation ledger.
///
/// Each equipment item's record and reservation rows sit behind one
/// `RwLock`, so bookings on the same item serialize while bookings on
/// different items proceed independently.
pub struct Engine {
    pub(super) equipment: Arc<DashMap<Ulid, SharedEquipmentState>>,
    /// Reverse lookup: reservation id → equipment id.
    pub(super) reservation_index: Arc<DashMap<Ulid, Ulid>>,
    /// User id → ids of that user's reservations.
    pub(super) user_index: Arc<DashMap<Ulid, HashSet<Ulid>>>,
    pub(super) log: Arc<dyn EventLog>,
    /// Commits hold this shared; compaction holds it exclusively while it snapshots.
    pub(super) snapshot_gate: Arc<RwLock<()>>,
    pub(super) options: EngineOptions,
}

/// A held write lock on one item, plus the shared snapshot gate.
/// Dropping it records the operation's latency.
pub(super) struct WriteSlot {
    _gate: OwnedRwLockReadGuard<()>,
    pub state: OwnedRwLockWriteGuard<EquipmentState>,
    op: &'static str,
    started: Instant,
}

impl Drop for WriteSlot {
    fn drop(&mut self) {
        metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "op" => self.op)
            .record(self.started.elapsed().as_secs_f64());
    }
}

/// The engine's shared maps and log, cloned into commit tasks so a commit
/// finishes even if its caller stops waiting.
#[derive(Clone)]
pub(super) struct Committer {
    equipment: Arc<DashMap<Ulid, SharedEquipmentState>>,
    reservation_index: Arc<DashMap<Ulid, Ulid>>,
    user_index: Arc<DashMap<Ulid, HashSet<Ulid>>>,
    log: Arc<dyn EventLog>,
}

impl Committer {
    async fn persist(&self, op: &'static str, event: &Event) -> Result<(), EngineError> {
        self.log.append(event).await.map_err(|e| {
            warn!("{op}: log append failed: {e}");
            EngineError::store(op, e)
        })
    }

    fn index_reservation(&self, r: &Reservation) {
        self.reservation_index.insert(r.id, r.equipment_id);
        self.user_index.entry(r.user_id).or_default().insert(r.id);
    }

    fn unindex_reservation(&self, r: &Reservation) {
        self.reservation_index.remove(&r.id);
        if let Some(mut ids) = self.user_index.get_mut(&r.user_id) {
            ids.remove(&r.id);
        }
        self.user_index.remove_if(&r.user_id, |_, ids| ids.is_empty());
    }

    /// Apply a committed event to the locked item and the indexes.
    fn apply(&self, st: &mut EquipmentState, event: &Event) {
        match event {
            Event::ReservationBooked { id, .. } => {
                apply_to_equipment(st, event);
                if let Some(r) = st.reservations.iter().find(|r| r.id == *id) {
                    self.index_reservation(r);
                }
            }
            Event::ReservationCancelled { id, .. } => {
                if let Some(r) = st.remove_reservation(*id) {
                    self.unindex_reservation(&r);
                }
            }
            Event::EquipmentDeleted { id } => {
                st.retired = true;
                for r in std::mem::take(&mut st.reservations) {
                    self.unindex_reservation(&r);
                }
                self.equipment.remove(id);
                metrics::gauge!(crate::observability::EQUIPMENT_ACTIVE).set(self.equipment.len() as f64);
            }
            Event::EquipmentUpdated { .. } => apply_to_equipment(st, event),
            // Creation has no item to lock; see `insert_new`.
            Event::EquipmentCreated { .. } => {}
        }
    }

    fn insert_new(&self, st: EquipmentState) {
        self.equipment.insert(st.id, Arc::new(RwLock::new(st)));
        metrics::gauge!(crate::observability::EQUIPMENT_ACTIVE).set(self.equipment.len() as f64);
    }
}

/// Run a commit on its own task and wait for it.
async fn detached<T: Send + 'static>(
    op: &'static str,
    commit: impl Future<Output = Result<T, EngineError>> + Send + 'static,
) -> Result<T, EngineError> {
    tokio::spawn(commit)
        .await
        .map_err(|e| EngineError::store(op, e))?
}

/// Apply a row-level event to one item's state (caller holds the lock).
fn apply_to_equipment(st: &mut EquipmentState, event: &Event) {
    match event {
        Event::EquipmentUpdated {
            name,
            short_description,
            full_description,
            ..
        } => {
            st.name = name.clone();
            st.short_description = short_description.clone();
            st.full_description = full_description.clone();
        }
        Event::ReservationBooked {
            id,
            equipment_id,
            user_id,
            span,
        } => st.insert_reservation(Reservation {
            id: *id,
            user_id: *user_id,
            equipment_id: *equipment_id,
            reservation_start: span.start,
            reservation_end: span.end,
        }),
        Event::ReservationCancelled { id, .. } => {
            st.remove_reservation(*id);
        }
        // Created/Deleted are handled at the map level, not here.
        Event::EquipmentCreated { .. } | Event::EquipmentDeleted { .. } => {}
    }
}

/// Rebuild item states from a sequence of events. A booking that overlaps a
/// row already replayed is dropped, so a damaged log cannot double-book.
fn replay_events(events: &[Event]) -> HashMap<Ulid, EquipmentState> {
    let mut states: HashMap<Ulid, EquipmentState> = HashMap::new();
    for event in events {
        match event {
            Event::EquipmentCreated {
                id,
                name,
                short_description,
                full_description,
            } => {
                states.insert(
                    *id,
                    EquipmentState::new(
                        *id,
                        name.clone(),
                        short_description.clone(),
                        full_description.clone(),
                    ),
                );
            }
            Event::EquipmentDeleted { id } => {
                states.remove(id);
            }
            Event::EquipmentUpdated { id, .. } => {
                if let Some(st) = states.get_mut(id) {
                    apply_to_equipment(st, event);
                }
            }
            Event::ReservationBooked {
                id,
                equipment_id,
                span,
                ..
            } => {
                let Some(st) = states.get_mut(equipment_id) else {
                    continue;
                };
                // Touching windows may have been legal under HalfOpen; only
                // a true overlap is corrupt.
                if let Some(existing) = st.first_conflict(span, OverlapPolicy::HalfOpen) {
                    warn!(
                        "replay: dropping reservation {id} on {equipment_id}: overlaps {}",
                        existing.id
                    );
                    continue;
                }
                apply_to_equipment(st, event);
            }
            Event::ReservationCancelled { equipment_id, .. } => {
                if let Some(st) = states.get_mut(equipment_id) {
                    apply_to_equipment(st, event);
                }
            }
        }
    }
    states
}

impl Engine {
    /// Open the disk-backed engine at `wal_path`, replaying any existing log.
    /// A torn or corrupt tail is cut off before new appends land.
    pub fn open(wal_path: &Path, options: EngineOptions) -> std::io::Result<Self> {
        let (log, replay) = WalLog::open(wal_path)?;
        if replay.discarded_tail {
            warn!(
                "{}: truncated corrupt log tail at byte {}",
                wal_path.display(),
                replay.valid_len
            );
        }
        let engine = Self::with_log(Box::new(log), &replay.events, options);
        info!(
            "replayed {} events: {} equipment, {} reservations",
            replay.events.len(),
            engine.equipment.len(),
            engine.reservation_index.len()
        );
        Ok(engine)
    }

    /// Engine backed by an in-process log. Nothing survives the process.
    pub fn in_memory(options: EngineOptions) -> Self {
        Self::with_log(Box::new(MemoryLog::new()), &[], options)
    }

    /// Engine over any log, with state rebuilt from `events`.
    pub fn with_log(log: Box<dyn EventLog>, events: &[Event], options: EngineOptions) -> Self {
        let engine = Self {
            equipment: Arc::new(DashMap::new()),
            reservation_index: Arc::new(DashMap::new()),
            user_index: Arc::new(DashMap::new()),
            log: Arc::from(log),
            snapshot_gate: Arc::new(RwLock::new(())),
            options,
        };
        let committer = engine.committer();
        for (id, st) in replay_events(events) {
            for r in &st.reservations {
                committer.index_reservation(r);
            }
            engine.equipment.insert(id, Arc::new(RwLock::new(st)));
        }
        metrics::gauge!(crate::observability::EQUIPMENT_ACTIVE).set(engine.equipment.len() as f64);
        engine
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    fn committer(&self) -> Committer {
        Committer {
            equipment: self.equipment.clone(),
            reservation_index: self.reservation_index.clone(),
            user_index: self.user_index.clone(),
            log: self.log.clone(),
        }
    }

    pub(super) fn get_state(&self, id: &Ulid) -> Option<SharedEquipmentState> {
        self.equipment.get(id).map(|e| e.value().clone())
    }

    /// All item states, collected without holding map guards across awaits.
    pub(super) fn all_states(&self) -> Vec<SharedEquipmentState> {
        self.equipment.iter().map(|e| e.value().clone()).collect()
    }

    /// Run `fut` under the operation deadline.
    pub(super) async fn within_deadline<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.options.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!("{op}: gave up after {:?}", self.options.op_timeout);
                metrics::counter!(crate::observability::TIMEOUTS_TOTAL, "op" => op).increment(1);
                Err(EngineError::Timeout(op))
            }
        };
        metrics::histogram!(crate::observability::LOCK_WAIT_SECONDS, "op" => op)
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Shared hold on the snapshot gate, for commits that create an item.
    pub(super) async fn hold_gate(&self, op: &'static str) -> Result<OwnedRwLockReadGuard<()>, EngineError> {
        self.within_deadline(op, async { Ok(self.snapshot_gate.clone().read_owned().await) })
            .await
    }

    /// Acquire the write lock on one item. Retired items are NotFound.
    pub(super) async fn lock_for_write(
        &self,
        op: &'static str,
        equipment_id: Ulid,
    ) -> Result<WriteSlot, EngineError> {
        let started = Instant::now();
        self.within_deadline(op, async {
            let gate = self.snapshot_gate.clone().read_owned().await;
            let rs = self
                .get_state(&equipment_id)
                .ok_or(EngineError::NotFound(equipment_id))?;
            let state = rs.write_owned().await;
            if state.retired {
                return Err(EngineError::NotFound(equipment_id));
            }
            Ok(WriteSlot {
                _gate: gate,
                state,
                op,
                started,
            })
        })
        .await
    }

    /// Acquire a read lock on one item. Retired items are NotFound.
    pub(super) async fn lock_for_read(
        &self,
        op: &'static str,
        equipment_id: Ulid,
    ) -> Result<OwnedRwLockReadGuard<EquipmentState>, EngineError> {
        self.within_deadline(op, async {
            let rs = self
                .get_state(&equipment_id)
                .ok_or(EngineError::NotFound(equipment_id))?;
            let state = rs.read_owned().await;
            if state.retired {
                return Err(EngineError::NotFound(equipment_id));
            }
            Ok(state)
        })
        .await
    }

    /// Durably log `event`, then apply it to the locked item, on a task that
    /// owns the lock. A caller that stops waiting cannot leave the log and
    /// memory disagreeing. On a store failure nothing is applied. The slot
    /// comes back for callers that commit several events under one lock.
    pub(super) async fn commit(
        &self,
        op: &'static str,
        mut slot: WriteSlot,
        event: Event,
    ) -> Result<WriteSlot, EngineError> {
        let committer = self.committer();
        detached(op, async move {
            committer.persist(op, &event).await?;
            committer.apply(&mut slot.state, &event);
            Ok(slot)
        })
        .await
    }

    /// Durably log a creation, then register the new item, on a task that
    /// owns the gate hold.
    pub(super) async fn commit_new(
        &self,
        op: &'static str,
        gate: OwnedRwLockReadGuard<()>,
        event: Event,
        st: EquipmentState,
    ) -> Result<(), EngineError> {
        let committer = self.committer();
        detached(op, async move {
            let _gate = gate;
            committer.persist(op, &event).await?;
            committer.insert_new(st);
            Ok(())
        })
        .await
    }
}
