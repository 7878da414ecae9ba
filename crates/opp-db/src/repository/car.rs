//! SurrealDB implementation of [`CarRepository`].
//!
//! The record key is the normalised plate, so a duplicate registration
//! fails on the key itself.

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::car::{Car, CreateCar, UpdateCar, normalize_plate};
use opp_core::repository::{CarRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use super::CountRow;
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CarRow {
    plate: String,
    brand: String,
    model: String,
    owner: String,
}

impl From<CarRow> for Car {
    fn from(row: CarRow) -> Self {
        Car {
            plate: row.plate,
            brand: row.brand,
            model: row.model,
            owner: row.owner,
        }
    }
}

/// Condition, prefixed by `joiner`, keeping cars that hold a paid ticket
/// still running at `$now`.
fn parked_clause(currently_parked: bool, joiner: &str) -> String {
    if currently_parked {
        format!(
            "{joiner} plate IN \
             (SELECT VALUE plate FROM ticket WHERE paid = true AND end_date >= $now)"
        )
    } else {
        String::new()
    }
}

#[derive(Clone)]
pub struct SurrealCarRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCarRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    async fn owned(&self, owner: &str, plate: &str) -> OppResult<Car> {
        let car = self.get(plate).await?;
        if car.owner != owner {
            // Another user's car is reported exactly like a missing one.
            return Err(OppError::not_found("car", plate));
        }
        Ok(car)
    }

    async fn is_referenced(&self, plate: &str) -> Result<Option<&'static str>, DbError> {
        for table in ["ticket", "fine"] {
            let query = format!("SELECT count() AS total FROM {table} WHERE plate = $plate GROUP ALL");
            let mut result = self
                .db
                .query(&query)
                .bind(("plate", plate.to_string()))
                .await?;
            let rows: Vec<CountRow> = result.take(0)?;
            if rows.first().map(|r| r.total).unwrap_or(0) > 0 {
                return Ok(Some(table));
            }
        }
        Ok(None)
    }
}

impl<C: Connection> CarRepository for SurrealCarRepository<C> {
    async fn create(&self, owner: &str, input: CreateCar) -> OppResult<Car> {
        let plate = normalize_plate(&input.plate);
        let mut result = self
            .db
            .query(
                "CREATE type::record('car', $plate) SET \
                 plate = $plate, brand = $brand, model = $model, owner = $owner",
            )
            .bind(("plate", plate.clone()))
            .bind(("brand", input.brand))
            .bind(("model", input.model))
            .bind(("owner", owner.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("car", e))?;

        let rows: Vec<CarRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("car", plate))?;
        Ok(row.into())
    }

    async fn get(&self, plate: &str) -> OppResult<Car> {
        let plate = normalize_plate(plate);
        let mut result = self
            .db
            .query("SELECT * FROM type::record('car', $plate)")
            .bind(("plate", plate.clone()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CarRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("car", plate))?;
        Ok(row.into())
    }

    async fn exists(&self, plate: &str) -> OppResult<bool> {
        match self.get(plate).await {
            Ok(_) => Ok(true),
            Err(OppError::NotFound { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn update(&self, owner: &str, plate: &str, input: UpdateCar) -> OppResult<Car> {
        let car = self.owned(owner, plate).await?;

        let mut result = self
            .db
            .query(
                "UPDATE type::record('car', $plate) SET \
                 brand = $brand, model = $model WHERE owner = $owner",
            )
            .bind(("plate", car.plate.clone()))
            .bind(("brand", input.brand.unwrap_or(car.brand)))
            .bind(("model", input.model.unwrap_or(car.model)))
            .bind(("owner", owner.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("car", e))?;

        let rows: Vec<CarRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("car", car.plate))?;
        Ok(row.into())
    }

    async fn delete(&self, owner: &str, plate: &str) -> OppResult<()> {
        let car = self.owned(owner, plate).await?;
        if let Some(table) = self.is_referenced(&car.plate).await? {
            return Err(OppError::InUse {
                entity: "car".into(),
                id: car.plate,
                referenced_by: table.into(),
            });
        }

        self.db
            .query("DELETE type::record('car', $plate) WHERE owner = $owner")
            .bind(("plate", car.plate))
            .bind(("owner", owner.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("car", e))?;
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        currently_parked: bool,
        now: DateTime<Utc>,
    ) -> OppResult<Vec<Car>> {
        let query = format!(
            "SELECT * FROM car WHERE owner = $owner{} ORDER BY plate ASC",
            parked_clause(currently_parked, " AND")
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("owner", owner.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<CarRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(Car::from).collect())
    }

    async fn list(
        &self,
        pagination: Pagination,
        currently_parked: bool,
        now: DateTime<Utc>,
    ) -> OppResult<PaginatedResult<Car>> {
        let where_clause = parked_clause(currently_parked, " WHERE");
        let mut result = self
            .db
            .query(format!("SELECT count() AS total FROM car{where_clause} GROUP ALL"))
            .query(format!(
                "SELECT * FROM car{where_clause} ORDER BY plate ASC LIMIT $limit START $offset"
            ))
            .bind(("now", now))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<CarRow> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: rows.into_iter().map(Car::from).collect(),
            total: count_rows.first().map(|r| r.total).unwrap_or(0),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn delete_all(&self) -> OppResult<u64> {
        let mut result = self
            .db
            .query(
                "DELETE car WHERE \
                 plate NOT IN (SELECT VALUE plate FROM ticket) AND \
                 plate NOT IN (SELECT VALUE plate FROM fine) \
                 RETURN BEFORE",
            )
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("car", e))?;
        let removed: Vec<CarRow> = result.take(0).map_err(DbError::from)?;
        Ok(removed.len() as u64)
    }
}
