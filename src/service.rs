use std::sync::Arc;

use tracing::{debug, info};
use ulid::Ulid;

use crate::config::Config;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::pagination::{EquipmentList, PageQuery};
use crate::repository::{EquipmentRepository, ReservationRepository};

/// Entry point for a presentation layer. Requests are validated here before
/// they reach the ledger; the caller supplies an already-authenticated user id.
pub struct BookingService {
    equipment: Arc<dyn EquipmentRepository>,
    reservations: Arc<dyn ReservationRepository>,
    default_page_size: usize,
    max_page_size: usize,
}

impl BookingService {
    pub fn new(
        equipment: Arc<dyn EquipmentRepository>,
        reservations: Arc<dyn ReservationRepository>,
        config: &Config,
    ) -> Self {
        Self {
            equipment,
            reservations,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    pub fn from_engine(engine: Arc<Engine>, config: &Config) -> Self {
        Self::new(engine.clone(), engine, config)
    }

    /// Resolve optional page parameters; size defaults from config and is
    /// clamped to the configured maximum.
    pub fn page(&self, page: Option<usize>, size: Option<usize>) -> Result<PageQuery, EngineError> {
        let size = size.unwrap_or(self.default_page_size).min(self.max_page_size);
        PageQuery::new(page.unwrap_or(0), size)
    }

    pub async fn book(
        &self,
        user_id: Ulid,
        equipment_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<ReserveOutcome, EngineError> {
        if end <= start {
            return Err(EngineError::Validation("reservation end must be after start"));
        }
        let outcome = self
            .reservations
            .reserve(user_id, equipment_id, start, end)
            .await?;
        match outcome {
            ReserveOutcome::Created { id } => info!("user {user_id} booked {equipment_id} as {id}"),
            ReserveOutcome::Rejected { conflicting } => {
                debug!("user {user_id} lost {equipment_id} to {conflicting}")
            }
        }
        Ok(outcome)
    }

    pub async fn is_available(&self, equipment_id: Ulid, start: Ms, end: Ms) -> Result<bool, EngineError> {
        if end <= start {
            return Err(EngineError::Validation("reservation end must be after start"));
        }
        Ok(!self.reservations.is_busy(equipment_id, start, end).await?)
    }

    pub async fn cancel_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        self.reservations.cancel(id).await
    }

    /// Drop everything the user holds, e.g. when their session is revoked.
    pub async fn release_user(&self, user_id: Ulid) -> Result<usize, EngineError> {
        let released = self.reservations.cancel_for_user(user_id).await?;
        info!("released {released} reservations held by {user_id}");
        Ok(released)
    }

    pub async fn reservation_info(&self, equipment_id: Ulid) -> Result<ReservationInfo, EngineError> {
        self.reservations.reservation_info(equipment_id).await
    }

    pub async fn register_equipment(&self, new: NewEquipment) -> Result<Equipment, EngineError> {
        let equipment = self.equipment.create(new).await?;
        info!("registered equipment {}", equipment.equipment_id);
        Ok(equipment)
    }

    pub async fn update_equipment(&self, update: EquipmentUpdate) -> Result<(), EngineError> {
        self.equipment.update(update).await
    }

    pub async fn remove_equipment(&self, id: Ulid) -> Result<(), EngineError> {
        self.equipment.delete(id).await?;
        info!("removed equipment {id}");
        Ok(())
    }

    pub async fn equipment(&self, id: Ulid) -> Result<Equipment, EngineError> {
        self.equipment.get_by_id(id).await
    }

    pub async fn list_equipment(
        &self,
        page: Option<usize>,
        size: Option<usize>,
    ) -> Result<EquipmentList, EngineError> {
        let query = self.page(page, size)?;
        self.equipment.list(query).await
    }

    pub async fn list_user_equipment(
        &self,
        user_id: Ulid,
        page: Option<usize>,
        size: Option<usize>,
    ) -> Result<EquipmentList, EngineError> {
        let query = self.page(page, size)?;
        self.equipment.list_for_user(user_id, query).await
    }
}
