//! SurrealDB implementation of [`ZoneRoleRepository`].

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::zone::Zone;
use opp_core::models::zone_role::{ZoneRole, ZoneUserRole};
use opp_core::repository::ZoneRoleRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::zone::{ZoneRowWithId, rows_into_zones};
use crate::error::DbError;

/// DB-side row struct for queries where the UUID is already known.
#[derive(Debug, SurrealValue)]
struct ZoneUserRoleRow {
    zone_id: String,
    username: String,
    role: String,
    assigned_at: DateTime<Utc>,
    assigned_by: String,
}

impl ZoneUserRoleRow {
    fn into_role(self, id: Uuid) -> Result<ZoneUserRole, DbError> {
        ZoneUserRoleRowWithId {
            record_id: id.to_string(),
            zone_id: self.zone_id,
            username: self.username,
            role: self.role,
            assigned_at: self.assigned_at,
            assigned_by: self.assigned_by,
        }
        .try_into_role()
    }
}

#[derive(Debug, SurrealValue)]
struct ZoneUserRoleRowWithId {
    record_id: String,
    zone_id: String,
    username: String,
    role: String,
    assigned_at: DateTime<Utc>,
    assigned_by: String,
}

impl ZoneUserRoleRowWithId {
    fn try_into_role(self) -> Result<ZoneUserRole, DbError> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("zone_user_role", e))?;
        let zone_id =
            Uuid::parse_str(&self.zone_id).map_err(|e| DbError::decode("zone_user_role", e))?;
        let role = self
            .role
            .parse::<ZoneRole>()
            .map_err(|e| DbError::decode("zone_user_role", e))?;
        Ok(ZoneUserRole {
            id,
            zone_id,
            username: self.username,
            role,
            assigned_at: self.assigned_at,
            assigned_by: self.assigned_by,
        })
    }
}

#[derive(Clone)]
pub struct SurrealZoneRoleRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealZoneRoleRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> ZoneRoleRepository for SurrealZoneRoleRepository<C> {
    async fn assign(
        &self,
        zone_id: Uuid,
        username: &str,
        role: ZoneRole,
        assigned_by: &str,
    ) -> OppResult<ZoneUserRole> {
        let id = Uuid::new_v4();
        let mut result = self
            .db
            .query(
                "CREATE type::record('zone_user_role', $id) SET \
                 zone_id = $zone_id, username = $username, \
                 role = $role, assigned_by = $assigned_by",
            )
            .bind(("id", id.to_string()))
            .bind(("zone_id", zone_id.to_string()))
            .bind(("username", username.to_string()))
            .bind(("role", role.as_str().to_string()))
            .bind(("assigned_by", assigned_by.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("zone_user_role", e))?;

        let rows: Vec<ZoneUserRoleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("zone_user_role", id))?;
        Ok(row.into_role(id)?)
    }

    async fn find(&self, zone_id: Uuid, username: &str) -> OppResult<Option<ZoneUserRole>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM zone_user_role \
                 WHERE zone_id = $zone_id AND username = $username",
            )
            .bind(("zone_id", zone_id.to_string()))
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ZoneUserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        rows.into_iter()
            .next()
            .map(|row| row.try_into_role().map_err(OppError::from))
            .transpose()
    }

    async fn remove(&self, zone_id: Uuid, username: &str) -> OppResult<()> {
        let mut result = self
            .db
            .query(
                "DELETE zone_user_role \
                 WHERE zone_id = $zone_id AND username = $username \
                 RETURN BEFORE",
            )
            .bind(("zone_id", zone_id.to_string()))
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let removed: Vec<ZoneUserRoleRow> = result.take(0).map_err(DbError::from)?;
        if removed.is_empty() {
            return Err(OppError::not_found(
                "zone_user_role",
                format!("{zone_id}/{username}"),
            ));
        }
        Ok(())
    }

    async fn list_by_zone(&self, zone_id: Uuid) -> OppResult<Vec<ZoneUserRole>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM zone_user_role \
                 WHERE zone_id = $zone_id ORDER BY assigned_at ASC",
            )
            .bind(("zone_id", zone_id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ZoneUserRoleRowWithId> = result.take(0).map_err(DbError::from)?;
        let roles = rows
            .into_iter()
            .map(|row| row.try_into_role())
            .collect::<Result<Vec<_>, DbError>>()?;
        Ok(roles)
    }

    async fn zones_for_user(&self, username: &str) -> OppResult<Vec<Zone>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM zone \
                 WHERE meta::id(id) IN (SELECT VALUE zone_id FROM zone_user_role \
                 WHERE username = $username) \
                 ORDER BY created_at ASC",
            )
            .bind(("username", username.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_zones(rows)?)
    }
}
