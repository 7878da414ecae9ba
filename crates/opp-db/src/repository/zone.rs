//! SurrealDB implementation of [`ZoneRepository`].
//!
//! Geometry is persisted as GeoJSON text next to its bounding box. The
//! box narrows candidates in the query; the exact spatial predicates run
//! in process over [`ZoneGeometry`].
//!
//! Every geometry write claims the `zone_guard` version it read the zone
//! set at, inside the write's own transaction. Two writers that checked
//! overlap against the same set cannot both commit; the loser re-reads
//! and checks again.

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::geometry::{Bounds, ZoneGeometry};
use opp_core::models::zone::{CreateZone, UpdateZone, Zone, ZonePricing};
use opp_core::repository::ZoneRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;

use super::{CountRow, retry_conflicts};
use crate::error::DbError;

const SELECT_ZONE: &str = "SELECT meta::id(id) AS record_id, * FROM zone";
const OLDEST_FIRST: &str = "ORDER BY created_at ASC, id ASC";

/// Fails retryable unless the zone set is still at `$version`, then moves
/// it on. First statement of every geometry write transaction.
const CLAIM_ZONE_SET: &str = "\
IF ((SELECT VALUE version FROM type::record('zone_guard', 'main'))[0] ?? 0) != $version { \
    THROW 'zone set changed since it was read; this transaction can be retried' \
}; \
UPSERT type::record('zone_guard', 'main') SET version = $version + 1;";

const REFERENCED_BY: &str = "zone still referenced by ";

#[derive(Debug, SurrealValue)]
struct GuardRow {
    version: i64,
}

#[derive(Debug, SurrealValue)]
pub(crate) struct ZoneRowWithId {
    record_id: String,
    name: String,
    available: bool,
    geometry: String,
    metadata: serde_json::Value,
    price_offset: f64,
    price_lin: f64,
    price_exp: f64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ZoneRowWithId {
    pub(crate) fn try_into_zone(self) -> Result<Zone, DbError> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("zone", e))?;
        let geometry = ZoneGeometry::from_geojson_str(&self.geometry)
            .map_err(|e| DbError::decode("zone", e))?;
        Ok(Zone {
            id,
            name: self.name,
            available: self.available,
            geometry,
            metadata: self.metadata,
            pricing: ZonePricing {
                price_offset: self.price_offset,
                price_lin: self.price_lin,
                price_exp: self.price_exp,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

pub(crate) fn rows_into_zones(rows: Vec<ZoneRowWithId>) -> Result<Vec<Zone>, DbError> {
    rows.into_iter().map(ZoneRowWithId::try_into_zone).collect()
}

/// First zone in `zones`, other than `exclude`, whose geometry overlaps
/// `candidate`.
fn find_overlap<'a>(
    zones: &'a [Zone],
    candidate: &ZoneGeometry,
    exclude: Option<Uuid>,
) -> Option<&'a Zone> {
    zones
        .iter()
        .filter(|z| Some(z.id) != exclude)
        .find(|z| z.geometry.overlaps(candidate))
}

fn geometry_text(geometry: &ZoneGeometry) -> String {
    geometry.to_geojson().to_string()
}

/// Map a failed delete, turning the reference guard's THROW into `InUse`.
fn delete_failure(id: Uuid, err: DbError) -> OppError {
    if let DbError::Statement { detail, .. } = &err {
        for table in ["ticket", "fine"] {
            if detail.contains(&format!("{REFERENCED_BY}{table}")) {
                return OppError::InUse {
                    entity: "zone".into(),
                    id: id.to_string(),
                    referenced_by: table.into(),
                };
            }
        }
    }
    err.into()
}

#[derive(Clone)]
pub struct SurrealZoneRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealZoneRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// `AlreadyExists` when a zone other than `owner` already uses `name`.
    async fn ensure_name_free(&self, name: &str, owner: Option<Uuid>) -> OppResult<()> {
        match self.get_by_name(name).await {
            Ok(zone) if Some(zone.id) != owner => Err(OppError::AlreadyExists {
                entity: "zone".into(),
            }),
            Ok(_) | Err(OppError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Guard version and the zones whose bounding box meets `bounds`, read
    /// in that order.
    async fn read_zone_set(&self, bounds: Bounds) -> Result<(i64, Vec<Zone>), DbError> {
        let mut result = self
            .db
            .query("SELECT version FROM type::record('zone_guard', 'main')")
            .query(format!(
                "{SELECT_ZONE} WHERE min_lon <= $max_lon AND max_lon >= $min_lon \
                 AND min_lat <= $max_lat AND max_lat >= $min_lat {OLDEST_FIRST}"
            ))
            .bind(("min_lon", bounds.min_lon))
            .bind(("min_lat", bounds.min_lat))
            .bind(("max_lon", bounds.max_lon))
            .bind(("max_lat", bounds.max_lat))
            .await?;
        let guard: Vec<GuardRow> = result.take(0)?;
        let rows: Vec<ZoneRowWithId> = result.take(1)?;
        let version = guard.first().map(|g| g.version).unwrap_or(0);
        Ok((version, rows_into_zones(rows)?))
    }

    /// Version to claim for writing `geometry`, or `Overlap`.
    async fn claimable_version(
        &self,
        geometry: &ZoneGeometry,
        exclude: Option<Uuid>,
    ) -> Result<i64, DbError> {
        let (version, candidates) = self.read_zone_set(geometry.bounds()).await?;
        match find_overlap(&candidates, geometry, exclude) {
            Some(other) => Err(DbError::Overlap {
                zone: other.name.clone(),
            }),
            None => Ok(version),
        }
    }

    async fn try_create(
        &self,
        id: Uuid,
        input: &CreateZone,
        metadata: &serde_json::Value,
        creator: &str,
    ) -> Result<(), DbError> {
        let version = self.claimable_version(&input.geometry, None).await?;
        let bounds = input.geometry.bounds();
        let response = self
            .db
            .query(format!(
                "BEGIN TRANSACTION; \
                 {CLAIM_ZONE_SET} \
                 CREATE type::record('zone', $id) SET \
                 name = $name, available = $available, \
                 geometry = $geometry, metadata = $metadata, \
                 price_offset = $price_offset, price_lin = $price_lin, \
                 price_exp = $price_exp, \
                 min_lon = $min_lon, min_lat = $min_lat, \
                 max_lon = $max_lon, max_lat = $max_lat; \
                 CREATE type::record('zone_user_role', $role_id) SET \
                 zone_id = $id, username = $creator, role = 'admin', \
                 assigned_by = $creator; \
                 COMMIT TRANSACTION;"
            ))
            .bind(("version", version))
            .bind(("id", id.to_string()))
            .bind(("role_id", Uuid::new_v4().to_string()))
            .bind(("name", input.name.clone()))
            .bind(("available", input.available))
            .bind(("geometry", geometry_text(&input.geometry)))
            .bind(("metadata", metadata.clone()))
            .bind(("price_offset", input.pricing.price_offset))
            .bind(("price_lin", input.pricing.price_lin))
            .bind(("price_exp", input.pricing.price_exp))
            .bind(("min_lon", bounds.min_lon))
            .bind(("min_lat", bounds.min_lat))
            .bind(("max_lon", bounds.max_lon))
            .bind(("max_lat", bounds.max_lat))
            .bind(("creator", creator.to_string()))
            .await?;
        DbError::check_transaction("zone", response)?;
        Ok(())
    }

    async fn try_update(&self, id: Uuid, input: &UpdateZone) -> Result<(), DbError> {
        let version = match input.geometry {
            Some(ref geometry) => Some(self.claimable_version(geometry, Some(id)).await?),
            None => None,
        };

        let mut sets = Vec::new();
        if input.name.is_some() {
            sets.push("name = $name");
        }
        if input.available.is_some() {
            sets.push("available = $available");
        }
        if input.geometry.is_some() {
            sets.push("geometry = $geometry");
            sets.push("min_lon = $min_lon, min_lat = $min_lat");
            sets.push("max_lon = $max_lon, max_lat = $max_lat");
        }
        if input.metadata.is_some() {
            sets.push("metadata = $metadata");
        }
        if input.pricing.is_some() {
            sets.push("price_offset = $price_offset");
            sets.push("price_lin = $price_lin");
            sets.push("price_exp = $price_exp");
        }
        sets.push("updated_at = time::now()");

        let update = format!(
            "UPDATE type::record('zone', $id) SET {};",
            sets.join(", ")
        );
        let query = match version {
            Some(_) => format!("BEGIN TRANSACTION; {CLAIM_ZONE_SET} {update} COMMIT TRANSACTION;"),
            None => update,
        };

        let mut builder = self.db.query(&query).bind(("id", id.to_string()));
        if let Some(version) = version {
            builder = builder.bind(("version", version));
        }
        if let Some(ref name) = input.name {
            builder = builder.bind(("name", name.clone()));
        }
        if let Some(available) = input.available {
            builder = builder.bind(("available", available));
        }
        if let Some(ref geometry) = input.geometry {
            let bounds = geometry.bounds();
            builder = builder
                .bind(("geometry", geometry_text(geometry)))
                .bind(("min_lon", bounds.min_lon))
                .bind(("min_lat", bounds.min_lat))
                .bind(("max_lon", bounds.max_lon))
                .bind(("max_lat", bounds.max_lat));
        }
        if let Some(ref metadata) = input.metadata {
            builder = builder.bind(("metadata", metadata.clone()));
        }
        if let Some(ref pricing) = input.pricing {
            builder = builder
                .bind(("price_offset", pricing.price_offset))
                .bind(("price_lin", pricing.price_lin))
                .bind(("price_exp", pricing.price_exp));
        }

        DbError::check_transaction("zone", builder.await?)?;
        Ok(())
    }

    async fn try_delete(&self, id: Uuid) -> Result<(), DbError> {
        let response = self
            .db
            .query(format!(
                "BEGIN TRANSACTION; \
                 IF array::len((SELECT VALUE id FROM ticket WHERE zone_id = $id LIMIT 1)) > 0 {{ \
                     THROW '{REFERENCED_BY}ticket' \
                 }} ELSE IF array::len((SELECT VALUE id FROM fine WHERE zone_id = $id LIMIT 1)) > 0 {{ \
                     THROW '{REFERENCED_BY}fine' \
                 }}; \
                 DELETE zone_user_role WHERE zone_id = $id; \
                 DELETE totem WHERE zone_id = $id; \
                 DELETE type::record('zone', $id); \
                 COMMIT TRANSACTION;"
            ))
            .bind(("id", id.to_string()))
            .await?;
        DbError::check_transaction("zone", response)?;
        Ok(())
    }
}

impl<C: Connection> ZoneRepository for SurrealZoneRepository<C> {
    async fn create(&self, input: CreateZone, creator: &str) -> OppResult<Zone> {
        self.ensure_name_free(&input.name, None).await?;

        let id = Uuid::new_v4();
        let metadata = input
            .metadata
            .clone()
            .unwrap_or(serde_json::Value::Object(Default::default()));
        retry_conflicts("zone", || self.try_create(id, &input, &metadata, creator)).await?;

        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> OppResult<Zone> {
        let id_str = id.to_string();
        let mut result = self
            .db
            .query("SELECT meta::id(id) AS record_id, * FROM type::record('zone', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("zone", id_str))?;
        Ok(row.try_into_zone()?)
    }

    async fn get_by_name(&self, name: &str) -> OppResult<Zone> {
        let mut result = self
            .db
            .query(format!("{SELECT_ZONE} WHERE name = $name"))
            .bind(("name", name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("zone", format!("name={name}")))?;
        Ok(row.try_into_zone()?)
    }

    async fn list_all(&self) -> OppResult<Vec<Zone>> {
        let mut result = self
            .db
            .query(format!("{SELECT_ZONE} {OLDEST_FIRST}"))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_zones(rows)?)
    }

    async fn update(&self, id: Uuid, input: UpdateZone) -> OppResult<Zone> {
        self.get_by_id(id).await?;
        if let Some(ref name) = input.name {
            self.ensure_name_free(name, Some(id)).await?;
        }
        retry_conflicts("zone", || self.try_update(id, &input)).await?;

        self.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> OppResult<()> {
        if !self.exists(id).await? {
            return Err(OppError::not_found("zone", id));
        }
        retry_conflicts("zone", || self.try_delete(id))
            .await
            .map_err(|e| delete_failure(id, e))?;
        debug!(zone_id = %id, "Zone deleted with its roles and totems");
        Ok(())
    }

    async fn find_containing(&self, longitude: f64, latitude: f64) -> OppResult<Vec<Zone>> {
        let mut result = self
            .db
            .query(format!(
                "{SELECT_ZONE} WHERE min_lon <= $lon AND max_lon >= $lon \
                 AND min_lat <= $lat AND max_lat >= $lat {OLDEST_FIRST}"
            ))
            .bind(("lon", longitude))
            .bind(("lat", latitude))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<ZoneRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(rows_into_zones(rows)?
            .into_iter()
            .filter(|z| z.geometry.contains_point(longitude, latitude))
            .collect())
    }

    async fn first_containing(&self, latitude: f64, longitude: f64) -> OppResult<Zone> {
        self.find_containing(longitude, latitude)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OppError::not_found("zone", format!("point=({latitude}, {longitude})")))
    }

    async fn exists(&self, id: Uuid) -> OppResult<bool> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM type::record('zone', $id) GROUP ALL")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.total).unwrap_or(0) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(name: &str, x0: f64) -> Zone {
        let geometry = ZoneGeometry::from_rings(
            &[(x0, 0.0), (x0 + 1.0, 0.0), (x0 + 1.0, 1.0), (x0, 1.0), (x0, 0.0)],
            &[],
        )
        .unwrap();
        Zone {
            id: Uuid::new_v4(),
            name: name.into(),
            available: true,
            geometry,
            metadata: serde_json::json!({}),
            pricing: ZonePricing {
                price_offset: 0.0,
                price_lin: 1.0,
                price_exp: 1.0,
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn overlap_check_skips_excluded_zone() {
        let zones = vec![zone("a", 0.0), zone("b", 2.0)];
        let moved = zone("a2", 0.5).geometry;
        assert_eq!(find_overlap(&zones, &moved, None).map(|z| z.name.as_str()), Some("a"));
        assert!(find_overlap(&zones, &moved, Some(zones[0].id)).is_none());
    }

    #[test]
    fn reference_guard_failure_becomes_in_use() {
        let id = Uuid::new_v4();
        let err = delete_failure(
            id,
            DbError::Statement {
                entity: "zone".into(),
                detail: format!("An error occurred: {REFERENCED_BY}fine"),
            },
        );
        assert!(
            matches!(&err, OppError::InUse { referenced_by, .. } if referenced_by == "fine"),
            "expected InUse, got: {err:?}"
        );

        let err = delete_failure(id, DbError::not_found("zone", id));
        assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
    }
}
