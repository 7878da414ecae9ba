//! Totem self-registration and administration.

use opp_auth::otp::OtpVerifier;
use opp_core::error::{OppError, OppResult};
use opp_core::models::totem::{Totem, TotemRequest, UpsertTotem};
use opp_core::models::user::{GlobalRole, Subject};
use opp_core::permission::{Capability, authorize, require_global};
use opp_core::repository::{
    PaginatedResult, Pagination, TotemRepository, ZoneRepository, ZoneRoleRepository,
};
use tracing::{info, warn};

pub struct TotemService<T, Z, R, O>
where
    T: TotemRepository,
    Z: ZoneRepository,
    R: ZoneRoleRepository,
    O: OtpVerifier,
{
    totems: T,
    zones: Z,
    roles: R,
    otp: O,
}

impl<T, Z, R, O> TotemService<T, Z, R, O>
where
    T: TotemRepository,
    Z: ZoneRepository,
    R: ZoneRoleRepository,
    O: OtpVerifier,
{
    pub fn new(totems: T, zones: Z, roles: R, otp: O) -> Self {
        Self {
            totems,
            zones,
            roles,
            otp,
        }
    }

    /// Register a kiosk, or refresh the zone and location of one already
    /// registered under the same id. Unauthenticated apart from the OTP.
    pub async fn register_totem(&self, request: TotemRequest) -> OppResult<Totem> {
        if request.id.trim().is_empty() {
            return Err(OppError::invalid_input("totem id must not be empty"));
        }
        if !(-90.0..=90.0).contains(&request.latitude)
            || !(-180.0..=180.0).contains(&request.longitude)
        {
            return Err(OppError::invalid_input("totem location is out of range"));
        }

        // 1. The one-time code gates everything else.
        if let Err(e) = self.otp.verify(&request.otp).await {
            warn!(totem_id = %request.id, error = %e, "Totem registration refused");
            return Err(e.into());
        }

        // 2. Zone must exist.
        if !self.zones.exists(request.zone_id).await? {
            return Err(OppError::not_found("zone", request.zone_id));
        }

        let totem = self
            .totems
            .upsert(UpsertTotem {
                id: request.id,
                zone_id: request.zone_id,
                latitude: request.latitude,
                longitude: request.longitude,
            })
            .await?;
        info!(totem_id = %totem.id, zone_id = %totem.zone_id, "Totem registered");
        Ok(totem)
    }

    /// Configuration lookup performed by the kiosk itself.
    pub async fn get_totem(&self, id: &str) -> OppResult<Totem> {
        self.totems.get_by_id(id).await
    }

    pub async fn list_totems(
        &self,
        subject: &Subject,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Totem>> {
        require_global(subject, GlobalRole::is_staff, "list totems")?;
        self.totems.list(pagination).await
    }

    /// Requires superuser or zone admin of the totem's zone.
    pub async fn delete_totem(&self, subject: &Subject, id: &str) -> OppResult<()> {
        let totem = self.totems.get_by_id(id).await?;
        authorize(&self.roles, subject, totem.zone_id, Capability::ZoneAdminAction).await?;
        self.totems.delete(id).await?;
        info!(totem_id = %id, by = %subject.username, "Totem deleted");
        Ok(())
    }
}
