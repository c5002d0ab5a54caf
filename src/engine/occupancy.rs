use futures::future::join_all;

use crate::model::*;
use crate::pagination::{EquipmentList, PageQuery};

use super::conflict::now_ms;
use super::{Engine, EngineError};

impl Engine {
    /// A page of all equipment, each flagged `reserved` if it is inside its
    /// nearest live window right now. Free items sort before reserved ones.
    pub async fn list_equipment(&self, query: PageQuery) -> Result<EquipmentList, EngineError> {
        self.list_equipment_at(query, now_ms()).await
    }

    pub async fn list_equipment_at(&self, query: PageQuery, now: Ms) -> Result<EquipmentList, EngineError> {
        if self.equipment.is_empty() {
            return Ok(EquipmentList::empty(query));
        }

        let states = self.all_states();
        let rows = self
            .within_deadline("list_equipment", async {
                Ok(join_all(states.into_iter().map(|rs| async move {
                    let st = rs.read().await;
                    (!st.retired).then(|| st.to_equipment(now))
                }))
                .await)
            })
            .await?;

        let mut items: Vec<Equipment> = rows.into_iter().flatten().collect();
        let total_count = items.len();
        // Ulids sort by creation time, which keeps pages stable within each group.
        items.sort_by_key(|e| (e.reserved, e.equipment_id));
        let page = items
            .into_iter()
            .skip(query.offset())
            .take(query.limit())
            .collect();
        Ok(EquipmentList::new(query, total_count, page))
    }
}
