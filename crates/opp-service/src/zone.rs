//! Zone registry service: zones and the roles users hold in them.

use opp_core::error::{OppError, OppResult};
use opp_core::models::user::{GlobalRole, Subject};
use opp_core::models::zone::{CreateZone, UpdateZone, Zone, ZonePricing};
use opp_core::models::zone_role::{AssignZoneRole, ZoneRole, ZoneUserRole};
use opp_core::permission::{Capability, authorize, require_global};
use opp_core::repository::{UserRepository, ZoneRepository, ZoneRoleRepository};
use tracing::info;
use uuid::Uuid;

pub struct ZoneService<Z: ZoneRepository, R: ZoneRoleRepository, U: UserRepository> {
    zones: Z,
    roles: R,
    users: U,
}

impl<Z: ZoneRepository, R: ZoneRoleRepository, U: UserRepository> ZoneService<Z, R, U> {
    pub fn new(zones: Z, roles: R, users: U) -> Self {
        Self {
            zones,
            roles,
            users,
        }
    }

    /// Create a zone. The creator becomes its zone admin in the same
    /// transaction as the insert.
    pub async fn create_zone(&self, subject: &Subject, input: CreateZone) -> OppResult<Zone> {
        require_global(subject, GlobalRole::is_admin, "create zones")?;
        validate_name(&input.name)?;
        validate_pricing(&input.pricing)?;
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }

        let zone = self.zones.create(input, &subject.username).await?;
        info!(zone_id = %zone.id, name = %zone.name, creator = %subject.username, "Zone created");
        Ok(zone)
    }

    pub async fn get_zone(&self, id: Uuid) -> OppResult<Zone> {
        self.zones.get_by_id(id).await
    }

    pub async fn get_zone_by_name(&self, name: &str) -> OppResult<Zone> {
        self.zones.get_by_name(name).await
    }

    pub async fn list_zones(&self) -> OppResult<Vec<Zone>> {
        self.zones.list_all().await
    }

    pub async fn zone_exists(&self, id: Uuid) -> OppResult<bool> {
        self.zones.exists(id).await
    }

    /// Every zone whose polygon strictly contains the point.
    pub async fn zones_containing(&self, longitude: f64, latitude: f64) -> OppResult<Vec<Zone>> {
        validate_coordinates(latitude, longitude)?;
        self.zones.find_containing(longitude, latitude).await
    }

    /// The zone a point falls in; the oldest one when several do.
    pub async fn zone_at(&self, latitude: f64, longitude: f64) -> OppResult<Zone> {
        validate_coordinates(latitude, longitude)?;
        self.zones.first_containing(latitude, longitude).await
    }

    pub async fn update_zone(
        &self,
        subject: &Subject,
        id: Uuid,
        input: UpdateZone,
    ) -> OppResult<Zone> {
        self.ensure_zone(id).await?;
        authorize(&self.roles, subject, id, Capability::ZoneAdminAction).await?;
        if let Some(name) = &input.name {
            validate_name(name)?;
        }
        if let Some(pricing) = &input.pricing {
            validate_pricing(pricing)?;
        }
        if let Some(metadata) = &input.metadata {
            validate_metadata(metadata)?;
        }

        let zone = self.zones.update(id, input).await?;
        info!(zone_id = %id, by = %subject.username, "Zone updated");
        Ok(zone)
    }

    pub async fn delete_zone(&self, subject: &Subject, id: Uuid) -> OppResult<()> {
        self.ensure_zone(id).await?;
        authorize(&self.roles, subject, id, Capability::ZoneAdminAction).await?;
        self.zones.delete(id).await?;
        info!(zone_id = %id, by = %subject.username, "Zone deleted");
        Ok(())
    }

    /// The role `username` holds in the zone.
    pub async fn zone_user_role(&self, zone_id: Uuid, username: &str) -> OppResult<ZoneUserRole> {
        self.roles
            .find(zone_id, username)
            .await?
            .ok_or_else(|| OppError::not_found("zone_user_role", format!("{zone_id}/{username}")))
    }

    pub async fn zone_users(&self, subject: &Subject, zone_id: Uuid) -> OppResult<Vec<ZoneUserRole>> {
        self.ensure_zone(zone_id).await?;
        authorize(&self.roles, subject, zone_id, Capability::ZoneAdminAction).await?;
        self.roles.list_by_zone(zone_id).await
    }

    /// Grant a zone role.
    ///
    /// Only a superuser may grant `admin`; granting `controller` needs the
    /// zone-admin capability on the zone.
    pub async fn add_user(
        &self,
        subject: &Subject,
        zone_id: Uuid,
        request: AssignZoneRole,
    ) -> OppResult<ZoneUserRole> {
        // 1. Reject unknown roles before touching anything.
        let role: ZoneRole = request.role.parse()?;

        // 2. The zone must exist, so a missing zone is not reported as a denial.
        self.ensure_zone(zone_id).await?;

        // 3. Authorize by the role being granted.
        match role {
            ZoneRole::Admin if !subject.is_superuser() => {
                return Err(OppError::forbidden(format!(
                    "{} may not grant the admin role",
                    subject.username
                )));
            }
            ZoneRole::Admin => {}
            ZoneRole::Controller => {
                authorize(&self.roles, subject, zone_id, Capability::ZoneAdminAction).await?;
            }
        }

        // 4. The grantee must be a registered user.
        if !self.users.exists(&request.username).await? {
            return Err(OppError::not_found("user", &request.username));
        }

        let assignment = self
            .roles
            .assign(zone_id, &request.username, role, &subject.username)
            .await?;
        info!(
            zone_id = %zone_id,
            username = %request.username,
            role = %role,
            by = %subject.username,
            "Zone role granted"
        );
        Ok(assignment)
    }

    pub async fn remove_user(&self, subject: &Subject, zone_id: Uuid, username: &str) -> OppResult<()> {
        self.ensure_zone(zone_id).await?;
        authorize(&self.roles, subject, zone_id, Capability::ZoneAdminAction).await?;
        self.roles.remove(zone_id, username).await?;
        info!(zone_id = %zone_id, username, by = %subject.username, "Zone role revoked");
        Ok(())
    }

    /// Zones in which the caller holds any role.
    pub async fn user_zones(&self, subject: &Subject) -> OppResult<Vec<Zone>> {
        self.roles.zones_for_user(&subject.username).await
    }

    /// Zones in which `username` holds any role. Looking up someone else
    /// takes a global admin; `NotFound` when the user holds no zone role.
    pub async fn zones_of_user(&self, subject: &Subject, username: &str) -> OppResult<Vec<Zone>> {
        if subject.username != username {
            require_global(subject, GlobalRole::is_admin, "read another user's zones")?;
        }
        let zones = self.roles.zones_for_user(username).await?;
        if zones.is_empty() {
            return Err(OppError::not_found("zone", format!("user={username}")));
        }
        Ok(zones)
    }

    async fn ensure_zone(&self, id: Uuid) -> OppResult<()> {
        if self.zones.exists(id).await? {
            Ok(())
        } else {
            Err(OppError::not_found("zone", id))
        }
    }
}

fn validate_name(name: &str) -> OppResult<()> {
    if name.trim().is_empty() {
        return Err(OppError::invalid_input("zone name must not be empty"));
    }
    Ok(())
}

fn validate_pricing(pricing: &ZonePricing) -> OppResult<()> {
    let finite = [pricing.price_offset, pricing.price_lin, pricing.price_exp]
        .iter()
        .all(|v| v.is_finite());
    if !finite {
        return Err(OppError::invalid_input("zone pricing must be finite"));
    }
    Ok(())
}

fn validate_metadata(metadata: &serde_json::Value) -> OppResult<()> {
    if !metadata.is_object() {
        return Err(OppError::invalid_input("zone metadata must be a JSON object"));
    }
    Ok(())
}

fn validate_coordinates(latitude: f64, longitude: f64) -> OppResult<()> {
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(OppError::invalid_input(format!(
            "coordinate ({latitude}, {longitude}) is out of range"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pricing_rejects_nan() {
        let pricing = ZonePricing {
            price_offset: 0.0,
            price_lin: f64::NAN,
            price_exp: 1.0,
        };
        assert!(validate_pricing(&pricing).is_err());
    }

    #[test]
    fn metadata_must_be_object() {
        assert!(validate_metadata(&json!({ "color": "red" })).is_ok());
        assert!(validate_metadata(&json!([1, 2])).is_err());
    }

    #[test]
    fn coordinates_out_of_range() {
        assert!(validate_coordinates(45.07, 7.68).is_ok());
        assert!(validate_coordinates(91.0, 0.0).is_err());
        assert!(validate_coordinates(0.0, -181.0).is_err());
    }
}
