//! SurrealDB implementation of [`FineRepository`].
//!
//! Fines share the ticket's terminal paid state: payment and deletion
//! only match `paid = false`.

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::fine::{CreateFine, Fine};
use opp_core::repository::{FineRepository, PaginatedResult, Pagination};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, retry_conflicts};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct FineRow {
    plate: String,
    zone_id: String,
    amount: f64,
    date: DateTime<Utc>,
    paid: bool,
}

impl FineRow {
    fn into_fine(self, id: Uuid) -> Result<Fine, DbError> {
        let zone_id = Uuid::parse_str(&self.zone_id).map_err(|e| DbError::decode("fine", e))?;
        Ok(Fine {
            id,
            plate: self.plate,
            zone_id,
            amount: self.amount,
            date: self.date,
            paid: self.paid,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct FineRowWithId {
    record_id: String,
    plate: String,
    zone_id: String,
    amount: f64,
    date: DateTime<Utc>,
    paid: bool,
}

impl FineRowWithId {
    fn try_into_fine(self) -> Result<Fine, DbError> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("fine", e))?;
        FineRow {
            plate: self.plate,
            zone_id: self.zone_id,
            amount: self.amount,
            date: self.date,
            paid: self.paid,
        }
        .into_fine(id)
    }
}

fn collect(rows: Vec<FineRowWithId>) -> Result<Vec<Fine>, DbError> {
    rows.into_iter().map(FineRowWithId::try_into_fine).collect()
}

#[derive(Clone)]
pub struct SurrealFineRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealFineRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Insert the fine and stamp its zone in one transaction.
    async fn try_create(&self, id: Uuid, input: &CreateFine) -> Result<(), DbError> {
        let response = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 UPDATE type::record('zone', $zone_id) SET last_issued_at = time::now(); \
                 CREATE type::record('fine', $id) SET \
                 plate = $plate, zone_id = $zone_id, amount = $amount, \
                 paid = false, date = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("plate", input.plate.clone()))
            .bind(("zone_id", input.zone_id.to_string()))
            .bind(("amount", input.amount))
            .await?;
        DbError::check_transaction("fine", response)?;
        Ok(())
    }

    /// Error for a conditional write on `paid = false` that matched nothing.
    async fn unpaid_guard_error(&self, id: Uuid) -> OppError {
        match self.get_by_id(id).await {
            Ok(fine) if fine.paid => OppError::AlreadyPaid {
                entity: "fine".into(),
                id: id.to_string(),
            },
            Ok(_) => OppError::Internal(format!("fine {id} matched no unpaid row")),
            Err(e) => e,
        }
    }

    async fn select(&self, condition: &str, bind: (&'static str, String)) -> OppResult<Vec<Fine>> {
        let query = format!(
            "SELECT meta::id(id) AS record_id, * FROM fine WHERE {condition} ORDER BY date DESC"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(bind)
            .await
            .map_err(DbError::from)?;
        let rows: Vec<FineRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn page(
        &self,
        condition: Option<(&str, (&'static str, String))>,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Fine>> {
        let where_clause = condition
            .as_ref()
            .map(|(c, _)| format!(" WHERE {c}"))
            .unwrap_or_default();
        let mut builder = self
            .db
            .query(format!("SELECT count() AS total FROM fine{where_clause} GROUP ALL"))
            .query(format!(
                "SELECT meta::id(id) AS record_id, * FROM fine{where_clause} \
                 ORDER BY date DESC LIMIT $limit START $offset"
            ))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some((_, bind)) = condition {
            builder = builder.bind(bind);
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<FineRowWithId> = result.take(1).map_err(DbError::from)?;
        Ok(PaginatedResult {
            items: collect(rows)?,
            total: count_rows.first().map(|r| r.total).unwrap_or(0),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}

impl<C: Connection> FineRepository for SurrealFineRepository<C> {
    async fn create(&self, input: CreateFine) -> OppResult<Fine> {
        let id = Uuid::new_v4();
        retry_conflicts("fine", || self.try_create(id, &input)).await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> OppResult<Fine> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('fine', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<FineRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("fine", id))?;
        Ok(row.into_fine(id)?)
    }

    async fn pay(&self, id: Uuid) -> OppResult<Fine> {
        let mut result = self
            .db
            .query("UPDATE type::record('fine', $id) SET paid = true WHERE paid = false")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("fine", e))?;
        let rows: Vec<FineRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_fine(id)?),
            None => Err(self.unpaid_guard_error(id).await),
        }
    }

    async fn delete_unpaid(&self, id: Uuid) -> OppResult<()> {
        let mut result = self
            .db
            .query("DELETE type::record('fine', $id) WHERE paid = false RETURN BEFORE")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("fine", e))?;
        let rows: Vec<FineRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(self.unpaid_guard_error(id).await);
        }
        Ok(())
    }

    async fn delete_all(&self) -> OppResult<u64> {
        let mut result = self
            .db
            .query("DELETE fine RETURN BEFORE")
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("fine", e))?;
        let rows: Vec<FineRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.len() as u64)
    }

    async fn list(&self, pagination: Pagination) -> OppResult<PaginatedResult<Fine>> {
        self.page(None, pagination).await
    }

    async fn list_by_plate(&self, plate: &str) -> OppResult<Vec<Fine>> {
        self.select("plate = $plate", ("plate", plate.to_string()))
            .await
    }

    async fn list_by_owner(&self, owner: &str) -> OppResult<Vec<Fine>> {
        self.select(
            "plate IN (SELECT VALUE plate FROM car WHERE owner = $owner)",
            ("owner", owner.to_string()),
        )
        .await
    }

    async fn list_by_zone(
        &self,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Fine>> {
        self.page(
            Some(("zone_id = $zone_id", ("zone_id", zone_id.to_string()))),
            pagination,
        )
        .await
    }
}
