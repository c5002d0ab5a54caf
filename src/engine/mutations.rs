use std::time::Instant;

use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;

use super::conflict::{find_conflict, now_ms, validate_fields, validate_window};
use super::{Engine, EngineError};

impl Engine {
    // ── Equipment registry ───────────────────────────────────

    pub async fn create_equipment(&self, new: NewEquipment) -> Result<Equipment, EngineError> {
        const OP: &str = "create_equipment";
        let started = Instant::now();
        validate_fields(&new.name, &new.short_description, &new.full_description)?;

        let id = Ulid::new();
        let event = Event::EquipmentCreated {
            id,
            name: new.name.clone(),
            short_description: new.short_description.clone(),
            full_description: new.full_description.clone(),
        };
        let st = EquipmentState::new(id, new.name, new.short_description, new.full_description);
        let equipment = st.to_equipment(now_ms());

        let gate = self.hold_gate(OP).await?;
        self.commit_new(OP, gate, event, st).await?;
        metrics::histogram!(crate::observability::OPERATION_DURATION_SECONDS, "op" => OP)
            .record(started.elapsed().as_secs_f64());
        debug!("created equipment {id}");
        Ok(equipment)
    }

    pub async fn update_equipment(&self, update: EquipmentUpdate) -> Result<(), EngineError> {
        const OP: &str = "update_equipment";
        let name = update.name.as_deref().unwrap_or("");
        validate_fields(name, &update.short_description, &update.full_description)?;

        let id = update.equipment_id;
        let slot = self.lock_for_write(OP, id).await?;
        let event = Event::EquipmentUpdated {
            id,
            name: update.name.unwrap_or_else(|| slot.state.name.clone()),
            short_description: update.short_description,
            full_description: update.full_description,
        };
        self.commit(OP, slot, event).await?;
        debug!("updated equipment {id}");
        Ok(())
    }

    /// Delete an item. Refused while any of its reservations is still live;
    /// reservations that have already ended are removed with it.
    pub async fn delete_equipment(&self, id: Ulid) -> Result<(), EngineError> {
        self.delete_equipment_at(id, now_ms()).await
    }

    pub async fn delete_equipment_at(&self, id: Ulid, now: Ms) -> Result<(), EngineError> {
        const OP: &str = "delete_equipment";
        let slot = self.lock_for_write(OP, id).await?;
        if slot.state.has_live(now) {
            return Err(EngineError::HasLiveReservations(id));
        }
        self.commit(OP, slot, Event::EquipmentDeleted { id }).await?;
        debug!("deleted equipment {id}");
        Ok(())
    }

    // ── Reservation ledger ───────────────────────────────────

    /// Book `[start, end)` on an item for a user.
    ///
    /// The conflict check and the insert happen under the item's write lock,
    /// so of two concurrent overlapping requests exactly one is created.
    pub async fn reserve(
        &self,
        user_id: Ulid,
        equipment_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<ReserveOutcome, EngineError> {
        const OP: &str = "reserve";
        let span = validate_window(start, end)?;
        let slot = self.lock_for_write(OP, equipment_id).await?;

        if let Some(conflicting) = find_conflict(&slot.state, &span, self.options.overlap) {
            metrics::counter!(crate::observability::RESERVATIONS_TOTAL, "status" => "rejected")
                .increment(1);
            debug!("reserve {equipment_id} [{start}, {end}) rejected: conflicts with {conflicting}");
            return Ok(ReserveOutcome::Rejected { conflicting });
        }

        let id = Ulid::new();
        let event = Event::ReservationBooked {
            id,
            equipment_id,
            user_id,
            span,
        };
        self.commit(OP, slot, event).await?;

        metrics::counter!(crate::observability::RESERVATIONS_TOTAL, "status" => "created")
            .increment(1);
        debug!("reserve {equipment_id} [{start}, {end}) created {id} for {user_id}");
        Ok(ReserveOutcome::Created { id })
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        const OP: &str = "cancel_reservation";
        let equipment_id = self
            .reservation_index
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let slot = self.lock_for_write(OP, equipment_id).await?;
        if !slot.state.reservations.iter().any(|r| r.id == id) {
            return Err(EngineError::NotFound(id));
        }
        self.commit(OP, slot, Event::ReservationCancelled { id, equipment_id })
            .await?;
        Ok(())
    }

    /// Delete every reservation the user holds. NotFound if there were none.
    pub async fn cancel_user_reservations(&self, user_id: Ulid) -> Result<usize, EngineError> {
        const OP: &str = "cancel_user_reservations";
        let mut cancelled = 0;
        for (equipment_id, ids) in self.user_reservation_ids(user_id) {
            let mut slot = match self.lock_for_write(OP, equipment_id).await {
                Ok(slot) => slot,
                // Deleted meanwhile; its rows went with it.
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            for id in ids {
                if !slot.state.reservations.iter().any(|r| r.id == id) {
                    continue;
                }
                slot = self
                    .commit(OP, slot, Event::ReservationCancelled { id, equipment_id })
                    .await?;
                cancelled += 1;
            }
        }

        if cancelled == 0 {
            return Err(EngineError::NotFound(user_id));
        }
        debug!("cancelled {cancelled} reservations for {user_id}");
        Ok(cancelled)
    }

    // ── Log maintenance ──────────────────────────────────────

    /// Rewrite the log with only the events needed to recreate the current state.
    pub async fn compact_log(&self) -> Result<(), EngineError> {
        const OP: &str = "compact_log";
        // Exclusive gate: no commit can land between the snapshot and the swap.
        let _gate = self.snapshot_gate.write().await;

        let mut events = Vec::new();
        let mut snapshot = Vec::new();
        for rs in self.all_states() {
            let guard = rs.read_owned().await;
            if !guard.retired {
                snapshot.push(guard);
            }
        }
        snapshot.sort_by_key(|g| g.id);

        for st in &snapshot {
            events.push(Event::EquipmentCreated {
                id: st.id,
                name: st.name.clone(),
                short_description: st.short_description.clone(),
                full_description: st.full_description.clone(),
            });
            for r in &st.reservations {
                events.push(Event::ReservationBooked {
                    id: r.id,
                    equipment_id: r.equipment_id,
                    user_id: r.user_id,
                    span: r.span(),
                });
            }
        }
        drop(snapshot);

        let count = events.len();
        self.log
            .compact(events)
            .await
            .map_err(|e| EngineError::store(OP, e))?;
        info!("compacted log to {count} events");
        Ok(())
    }

    pub async fn log_appends_since_compact(&self) -> u64 {
        self.log.appends_since_compact().await
    }
}
