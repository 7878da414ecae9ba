//! Fine lifecycle. Fines are role-gated on their zone, never owner-gated.

use opp_core::error::{OppError, OppResult};
use opp_core::models::car::normalize_plate;
use opp_core::models::fine::{CreateFine, Fine, FineRequest};
use opp_core::models::user::{GlobalRole, Subject};
use opp_core::permission::{Capability, authorize, require_global};
use opp_core::repository::{
    CarRepository, FineRepository, PaginatedResult, Pagination, ZoneRepository,
    ZoneRoleRepository,
};
use tracing::info;
use uuid::Uuid;

pub struct FineService<F, Z, C, R>
where
    F: FineRepository,
    Z: ZoneRepository,
    C: CarRepository,
    R: ZoneRoleRepository,
{
    fines: F,
    zones: Z,
    cars: C,
    roles: R,
}

impl<F, Z, C, R> FineService<F, Z, C, R>
where
    F: FineRepository,
    Z: ZoneRepository,
    C: CarRepository,
    R: ZoneRoleRepository,
{
    pub fn new(fines: F, zones: Z, cars: C, roles: R) -> Self {
        Self {
            fines,
            zones,
            cars,
            roles,
        }
    }

    /// Issue a fine against `plate`. Requires controller capability on
    /// the fine's zone.
    pub async fn add_car_fine(
        &self,
        subject: &Subject,
        plate: &str,
        request: FineRequest,
    ) -> OppResult<Fine> {
        if !request.amount.is_finite() || request.amount <= 0.0 {
            return Err(OppError::invalid_input("fine amount must be a positive number"));
        }
        if !self.zones.exists(request.zone_id).await? {
            return Err(OppError::not_found("zone", request.zone_id));
        }
        authorize(&self.roles, subject, request.zone_id, Capability::ZoneControllerAction).await?;

        let plate = normalize_plate(plate);
        if !self.cars.exists(&plate).await? {
            return Err(OppError::not_found("car", &plate));
        }

        let fine = self
            .fines
            .create(CreateFine {
                plate,
                zone_id: request.zone_id,
                amount: request.amount,
            })
            .await?;
        info!(
            fine_id = %fine.id,
            zone_id = %fine.zone_id,
            plate = %fine.plate,
            amount = fine.amount,
            by = %subject.username,
            "Fine issued"
        );
        Ok(fine)
    }

    pub async fn pay_fine(&self, subject: &Subject, id: Uuid) -> OppResult<Fine> {
        let fine = self.fines.pay(id).await?;
        info!(fine_id = %id, by = %subject.username, "Fine paid");
        Ok(fine)
    }

    /// Delete an unpaid fine. A paid fine stays as a record of the
    /// payment, whoever asks.
    pub async fn delete_fine(&self, subject: &Subject, id: Uuid) -> OppResult<()> {
        let fine = self.fines.get_by_id(id).await?;
        authorize(&self.roles, subject, fine.zone_id, Capability::ZoneControllerAction).await?;
        if fine.paid {
            return Err(OppError::AlreadyPaid {
                entity: "fine".into(),
                id: id.to_string(),
            });
        }
        self.fines.delete_unpaid(id).await?;
        info!(fine_id = %id, by = %subject.username, "Fine deleted");
        Ok(())
    }

    /// Fines against every car of the caller.
    pub async fn user_fines(&self, subject: &Subject) -> OppResult<Vec<Fine>> {
        self.fines.list_by_owner(&subject.username).await
    }

    pub async fn zone_fines(
        &self,
        subject: &Subject,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Fine>> {
        if !self.zones.exists(zone_id).await? {
            return Err(OppError::not_found("zone", zone_id));
        }
        authorize(&self.roles, subject, zone_id, Capability::ZoneControllerAction).await?;
        self.fines.list_by_zone(zone_id, pagination).await
    }

    pub async fn list_fines(
        &self,
        subject: &Subject,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Fine>> {
        require_global(subject, GlobalRole::is_staff, "list fines")?;
        self.fines.list(pagination).await
    }

    pub async fn car_fines(&self, subject: &Subject, plate: &str) -> OppResult<Vec<Fine>> {
        require_global(subject, GlobalRole::is_staff, "read car fines")?;
        self.fines.list_by_plate(&normalize_plate(plate)).await
    }

    pub async fn get_fine(&self, subject: &Subject, id: Uuid) -> OppResult<Fine> {
        require_global(subject, GlobalRole::is_admin, "read fines by id")?;
        self.fines.get_by_id(id).await
    }

    /// Remove every fine. Returns how many were deleted.
    pub async fn delete_fines(&self, subject: &Subject) -> OppResult<u64> {
        require_global(subject, GlobalRole::is_admin, "delete all fines")?;
        let deleted = self.fines.delete_all().await?;
        info!(deleted, by = %subject.username, "All fines deleted");
        Ok(deleted)
    }
}
