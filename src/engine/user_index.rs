use ulid::Ulid;

use crate::model::*;
use crate::pagination::{EquipmentList, PageQuery};

use super::conflict::now_ms;
use super::{Engine, EngineError};

impl Engine {
    /// A page of the distinct items the user holds a live reservation on,
    /// ordered by the user's earliest live start on each item.
    pub async fn list_for_user(&self, user_id: Ulid, query: PageQuery) -> Result<EquipmentList, EngineError> {
        self.list_for_user_at(user_id, query, now_ms()).await
    }

    pub async fn list_for_user_at(
        &self,
        user_id: Ulid,
        query: PageQuery,
        now: Ms,
    ) -> Result<EquipmentList, EngineError> {
        const OP: &str = "list_for_user";
        let grouped = self.user_reservation_ids(user_id);
        if grouped.is_empty() {
            return Ok(EquipmentList::empty(query));
        }

        let mut held: Vec<(Ms, Equipment)> = Vec::with_capacity(grouped.len());
        for (equipment_id, ids) in grouped {
            let st = match self.lock_for_read(OP, equipment_id).await {
                Ok(st) => st,
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let earliest = st
                .reservations
                .iter()
                .filter(|r| ids.contains(&r.id) && r.is_live(now))
                .map(|r| r.reservation_start)
                .min();
            if let Some(start) = earliest {
                let mut equipment = st.to_equipment(now);
                equipment.reserved = true;
                held.push((start, equipment));
            }
        }

        let total_count = held.len();
        if total_count == 0 {
            return Ok(EquipmentList::empty(query));
        }
        held.sort_by_key(|(start, e)| (*start, e.equipment_id));
        let page = held
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .map(|(_, e)| e)
            .collect();
        Ok(EquipmentList::new(query, total_count, page))
    }
}
