use std::collections::{HashMap, HashSet};

use ulid::Ulid;

use crate::model::*;

use super::conflict::{now_ms, validate_window};
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_equipment(&self, id: Ulid) -> Result<Equipment, EngineError> {
        self.get_equipment_at(id, now_ms()).await
    }

    pub async fn get_equipment_at(&self, id: Ulid, now: Ms) -> Result<Equipment, EngineError> {
        let st = self.lock_for_read("get_equipment", id).await?;
        Ok(st.to_equipment(now))
    }

    pub fn equipment_count(&self) -> usize {
        self.equipment.len()
    }

    /// Whether any stored window on the item conflicts with `[start, end)`.
    /// An item with no reservations is simply free.
    pub async fn is_busy(&self, equipment_id: Ulid, start: Ms, end: Ms) -> Result<bool, EngineError> {
        let span = validate_window(start, end)?;
        let st = self.lock_for_read("is_busy", equipment_id).await?;
        Ok(st.first_conflict(&span, self.options.overlap).is_some())
    }

    /// Every reservation on the item, ordered by start.
    pub async fn reservations_for(&self, equipment_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        let st = self.lock_for_read("reservations_for", equipment_id).await?;
        Ok(st.reservations.clone())
    }

    /// The item's full booking calendar: every window plus how many there are.
    pub async fn reservation_info(&self, equipment_id: Ulid) -> Result<ReservationInfo, EngineError> {
        let st = self.lock_for_read("reservation_info", equipment_id).await?;
        let windows: Vec<Span> = st.reservations.iter().map(Reservation::span).collect();
        Ok(ReservationInfo {
            amount: windows.len(),
            windows,
        })
    }

    /// Every reservation the user holds, ordered by start.
    pub async fn reservations_for_user(&self, user_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        const OP: &str = "reservations_for_user";
        let mut rows = Vec::new();
        for (equipment_id, ids) in self.user_reservation_ids(user_id) {
            let st = match self.lock_for_read(OP, equipment_id).await {
                Ok(st) => st,
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            rows.extend(st.reservations.iter().filter(|r| ids.contains(&r.id)).cloned());
        }
        sort_by_start(&mut rows);
        Ok(rows)
    }

    /// Distinct items on which the user holds a reservation that has not ended.
    pub async fn active_or_future_count(&self, user_id: Ulid) -> Result<usize, EngineError> {
        self.active_or_future_count_at(user_id, now_ms()).await
    }

    pub async fn active_or_future_count_at(&self, user_id: Ulid, now: Ms) -> Result<usize, EngineError> {
        let rows = self.reservations_for_user(user_id).await?;
        let items: HashSet<Ulid> = rows
            .iter()
            .filter(|r| r.is_live(now))
            .map(|r| r.equipment_id)
            .collect();
        Ok(items.len())
    }

    /// The user's reservation ids grouped by equipment id.
    pub(super) fn user_reservation_ids(&self, user_id: Ulid) -> HashMap<Ulid, HashSet<Ulid>> {
        let ids: Vec<Ulid> = self
            .user_index
            .get(&user_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default();
        let mut grouped: HashMap<Ulid, HashSet<Ulid>> = HashMap::new();
        for id in ids {
            if let Some(eid) = self.reservation_index.get(&id).map(|e| *e.value()) {
                grouped.entry(eid).or_default().insert(id);
            }
        }
        grouped
    }
}
