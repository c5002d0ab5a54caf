//! Capability traits over the registry and the ledger, so callers can run
//! against the engine or a stand-in.

use async_trait::async_trait;
use ulid::Ulid;

use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::pagination::{EquipmentList, PageQuery};

#[async_trait]
pub trait EquipmentRepository: Send + Sync {
    async fn create(&self, new: NewEquipment) -> Result<Equipment, EngineError>;
    async fn update(&self, update: EquipmentUpdate) -> Result<(), EngineError>;
    async fn delete(&self, id: Ulid) -> Result<(), EngineError>;
    async fn get_by_id(&self, id: Ulid) -> Result<Equipment, EngineError>;
    /// All equipment with occupancy, free items first.
    async fn list(&self, query: PageQuery) -> Result<EquipmentList, EngineError>;
    /// Items the user holds a live reservation on.
    async fn list_for_user(&self, user_id: Ulid, query: PageQuery) -> Result<EquipmentList, EngineError>;
}

#[async_trait]
pub trait ReservationRepository: Send + Sync {
    async fn is_busy(&self, equipment_id: Ulid, start: Ms, end: Ms) -> Result<bool, EngineError>;
    async fn reserve(
        &self,
        user_id: Ulid,
        equipment_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<ReserveOutcome, EngineError>;
    async fn reservations_for(&self, equipment_id: Ulid) -> Result<Vec<Reservation>, EngineError>;
    async fn reservation_info(&self, equipment_id: Ulid) -> Result<ReservationInfo, EngineError>;
    async fn active_or_future_count(&self, user_id: Ulid) -> Result<usize, EngineError>;
    async fn cancel(&self, id: Ulid) -> Result<(), EngineError>;
    async fn cancel_for_user(&self, user_id: Ulid) -> Result<usize, EngineError>;
}

#[async_trait]
impl EquipmentRepository for Engine {
    async fn create(&self, new: NewEquipment) -> Result<Equipment, EngineError> {
        self.create_equipment(new).await
    }

    async fn update(&self, update: EquipmentUpdate) -> Result<(), EngineError> {
        self.update_equipment(update).await
    }

    async fn delete(&self, id: Ulid) -> Result<(), EngineError> {
        self.delete_equipment(id).await
    }

    async fn get_by_id(&self, id: Ulid) -> Result<Equipment, EngineError> {
        self.get_equipment(id).await
    }

    async fn list(&self, query: PageQuery) -> Result<EquipmentList, EngineError> {
        self.list_equipment(query).await
    }

    async fn list_for_user(&self, user_id: Ulid, query: PageQuery) -> Result<EquipmentList, EngineError> {
        Engine::list_for_user(self, user_id, query).await
    }
}

#[async_trait]
impl ReservationRepository for Engine {
    async fn is_busy(&self, equipment_id: Ulid, start: Ms, end: Ms) -> Result<bool, EngineError> {
        Engine::is_busy(self, equipment_id, start, end).await
    }

    async fn reserve(
        &self,
        user_id: Ulid,
        equipment_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<ReserveOutcome, EngineError> {
        Engine::reserve(self, user_id, equipment_id, start, end).await
    }

    async fn reservations_for(&self, equipment_id: Ulid) -> Result<Vec<Reservation>, EngineError> {
        Engine::reservations_for(self, equipment_id).await
    }

    async fn reservation_info(&self, equipment_id: Ulid) -> Result<ReservationInfo, EngineError> {
        Engine::reservation_info(self, equipment_id).await
    }

    async fn active_or_future_count(&self, user_id: Ulid) -> Result<usize, EngineError> {
        Engine::active_or_future_count(self, user_id).await
    }

    async fn cancel(&self, id: Ulid) -> Result<(), EngineError> {
        self.cancel_reservation(id).await
    }

    async fn cancel_for_user(&self, user_id: Ulid) -> Result<usize, EngineError> {
        self.cancel_user_reservations(user_id).await
    }
}
