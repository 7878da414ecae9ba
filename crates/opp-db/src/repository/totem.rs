//! SurrealDB implementation of [`TotemRepository`].

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::totem::{Totem, UpsertTotem};
use opp_core::repository::{PaginatedResult, Pagination, TotemRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::CountRow;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TotemRow {
    zone_id: String,
    latitude: f64,
    longitude: f64,
    registration_time: DateTime<Utc>,
}

impl TotemRow {
    fn into_totem(self, id: String) -> Result<Totem, DbError> {
        let zone_id = Uuid::parse_str(&self.zone_id).map_err(|e| DbError::decode("totem", e))?;
        Ok(Totem {
            id,
            zone_id,
            latitude: self.latitude,
            longitude: self.longitude,
            registration_time: self.registration_time,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct TotemRowWithId {
    record_id: String,
    zone_id: String,
    latitude: f64,
    longitude: f64,
    registration_time: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SurrealTotemRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTotemRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> TotemRepository for SurrealTotemRepository<C> {
    async fn upsert(&self, input: UpsertTotem) -> OppResult<Totem> {
        let mut result = self
            .db
            .query(
                "UPSERT type::record('totem', $id) SET \
                 zone_id = $zone_id, latitude = $latitude, \
                 longitude = $longitude, registration_time = time::now()",
            )
            .bind(("id", input.id.clone()))
            .bind(("zone_id", input.zone_id.to_string()))
            .bind(("latitude", input.latitude))
            .bind(("longitude", input.longitude))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("totem", e))?;

        let rows: Vec<TotemRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("totem", &input.id))?;
        Ok(row.into_totem(input.id)?)
    }

    async fn get_by_id(&self, id: &str) -> OppResult<Totem> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('totem', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TotemRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("totem", id))?;
        Ok(row.into_totem(id.to_string())?)
    }

    async fn list(&self, pagination: Pagination) -> OppResult<PaginatedResult<Totem>> {
        let mut result = self
            .db
            .query("SELECT count() AS total FROM totem GROUP ALL")
            .query(
                "SELECT meta::id(id) AS record_id, * FROM totem \
                 ORDER BY registration_time DESC LIMIT $limit START $offset",
            )
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<TotemRowWithId> = result.take(1).map_err(DbError::from)?;

        let items = rows
            .into_iter()
            .map(|row| {
                TotemRow {
                    zone_id: row.zone_id,
                    latitude: row.latitude,
                    longitude: row.longitude,
                    registration_time: row.registration_time,
                }
                .into_totem(row.record_id)
            })
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(PaginatedResult {
            items,
            total: count_rows.first().map(|r| r.total).unwrap_or(0),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn delete(&self, id: &str) -> OppResult<()> {
        let mut result = self
            .db
            .query("DELETE type::record('totem', $id) RETURN BEFORE")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("totem", e))?;
        let rows: Vec<TotemRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(OppError::not_found("totem", id));
        }
        Ok(())
    }
}
