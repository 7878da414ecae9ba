//! SurrealDB implementation of [`TicketRepository`].
//!
//! Payment and deletion are single conditional statements on
//! `paid = false`; the follow-up read only decides which error to report
//! when nothing matched.

use chrono::{DateTime, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::ticket::{CreateTicket, Ticket, TicketFilter};
use opp_core::repository::{PaginatedResult, Pagination, TicketRepository};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use super::{CountRow, retry_conflicts};
use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TicketRow {
    plate: String,
    zone_id: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price: f64,
    paid: bool,
    creation_time: DateTime<Utc>,
}

impl TicketRow {
    fn into_ticket(self, id: Uuid) -> Result<Ticket, DbError> {
        let zone_id = Uuid::parse_str(&self.zone_id).map_err(|e| DbError::decode("ticket", e))?;
        Ok(Ticket {
            id,
            plate: self.plate,
            zone_id,
            start_date: self.start_date,
            end_date: self.end_date,
            price: self.price,
            paid: self.paid,
            creation_time: self.creation_time,
        })
    }
}

#[derive(Debug, SurrealValue)]
struct TicketRowWithId {
    record_id: String,
    plate: String,
    zone_id: String,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    price: f64,
    paid: bool,
    creation_time: DateTime<Utc>,
}

impl TicketRowWithId {
    fn try_into_ticket(self) -> Result<Ticket, DbError> {
        let id = Uuid::parse_str(&self.record_id).map_err(|e| DbError::decode("ticket", e))?;
        TicketRow {
            plate: self.plate,
            zone_id: self.zone_id,
            start_date: self.start_date,
            end_date: self.end_date,
            price: self.price,
            paid: self.paid,
            creation_time: self.creation_time,
        }
        .into_ticket(id)
    }
}

fn collect(rows: Vec<TicketRowWithId>) -> Result<Vec<Ticket>, DbError> {
    rows.into_iter().map(TicketRowWithId::try_into_ticket).collect()
}

const SELECT_TICKET: &str = "SELECT meta::id(id) AS record_id, * FROM ticket";
const MOST_RECENT_FIRST: &str = "ORDER BY creation_time DESC, id DESC";

#[derive(Clone)]
pub struct SurrealTicketRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealTicketRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }

    /// Insert the ticket and stamp its zone in one transaction, so the
    /// insert and a concurrent delete of that zone write the same record.
    async fn try_create(&self, id: Uuid, input: &CreateTicket) -> Result<(), DbError> {
        let response = self
            .db
            .query(
                "BEGIN TRANSACTION; \
                 UPDATE type::record('zone', $zone_id) SET last_issued_at = time::now(); \
                 CREATE type::record('ticket', $id) SET \
                 plate = $plate, zone_id = $zone_id, \
                 start_date = $start_date, end_date = $end_date, \
                 price = $price, paid = false, creation_time = time::now(); \
                 COMMIT TRANSACTION;",
            )
            .bind(("id", id.to_string()))
            .bind(("plate", input.plate.clone()))
            .bind(("zone_id", input.zone_id.to_string()))
            .bind(("start_date", input.start_date))
            .bind(("end_date", input.end_date))
            .bind(("price", input.price))
            .await?;
        DbError::check_transaction("ticket", response)?;
        Ok(())
    }

    /// Error for a conditional write on `paid = false` that matched nothing.
    async fn unpaid_guard_error(&self, id: Uuid) -> OppError {
        match self.get_by_id(id).await {
            Ok(ticket) if ticket.paid => OppError::AlreadyPaid {
                entity: "ticket".into(),
                id: id.to_string(),
            },
            Ok(_) => OppError::Internal(format!("ticket {id} matched no unpaid row")),
            Err(e) => e,
        }
    }
}

impl<C: Connection> TicketRepository for SurrealTicketRepository<C> {
    async fn create(&self, input: CreateTicket) -> OppResult<Ticket> {
        let id = Uuid::new_v4();
        retry_conflicts("ticket", || self.try_create(id, &input)).await?;
        self.get_by_id(id).await
    }

    async fn get_by_id(&self, id: Uuid) -> OppResult<Ticket> {
        let mut result = self
            .db
            .query("SELECT * FROM type::record('ticket', $id)")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TicketRow> = result.take(0).map_err(DbError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DbError::not_found("ticket", id))?;
        Ok(row.into_ticket(id)?)
    }

    async fn pay(&self, id: Uuid) -> OppResult<Ticket> {
        let mut result = self
            .db
            .query("UPDATE type::record('ticket', $id) SET paid = true WHERE paid = false")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("ticket", e))?;
        let rows: Vec<TicketRow> = result.take(0).map_err(DbError::from)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row.into_ticket(id)?),
            None => Err(self.unpaid_guard_error(id).await),
        }
    }

    async fn delete_unpaid(&self, id: Uuid) -> OppResult<()> {
        let mut result = self
            .db
            .query("DELETE type::record('ticket', $id) WHERE paid = false RETURN BEFORE")
            .bind(("id", id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(|e| DbError::statement("ticket", e))?;
        let rows: Vec<TicketRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(self.unpaid_guard_error(id).await);
        }
        Ok(())
    }

    async fn list_by_owner(
        &self,
        owner: &str,
        valid_only: bool,
        now: DateTime<Utc>,
    ) -> OppResult<Vec<Ticket>> {
        let validity = if valid_only {
            " AND paid = true AND end_date >= $now"
        } else {
            ""
        };
        let query = format!(
            "{SELECT_TICKET} WHERE plate IN \
             (SELECT VALUE plate FROM car WHERE owner = $owner){validity} \
             {MOST_RECENT_FIRST}"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("owner", owner.to_string()))
            .bind(("now", now))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TicketRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list_by_plate(&self, plate: &str) -> OppResult<Vec<Ticket>> {
        let query = format!("{SELECT_TICKET} WHERE plate = $plate {MOST_RECENT_FIRST}");
        let mut result = self
            .db
            .query(&query)
            .bind(("plate", plate.to_string()))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TicketRowWithId> = result.take(0).map_err(DbError::from)?;
        Ok(collect(rows)?)
    }

    async fn list_by_zone(
        &self,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Ticket>> {
        let zone_id = zone_id.to_string();
        let mut count_result = self
            .db
            .query("SELECT count() AS total FROM ticket WHERE zone_id = $zone_id GROUP ALL")
            .bind(("zone_id", zone_id.clone()))
            .await
            .map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = count_result.take(0).map_err(DbError::from)?;
        let total = count_rows.first().map(|r| r.total).unwrap_or(0);

        let query = format!(
            "{SELECT_TICKET} WHERE zone_id = $zone_id {MOST_RECENT_FIRST} \
             LIMIT $limit START $offset"
        );
        let mut result = self
            .db
            .query(&query)
            .bind(("zone_id", zone_id))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset))
            .await
            .map_err(DbError::from)?;
        let rows: Vec<TicketRowWithId> = result.take(0).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total,
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }

    async fn list(&self, filter: TicketFilter, now: DateTime<Utc>) -> OppResult<PaginatedResult<Ticket>> {
        let mut conditions = Vec::new();
        if filter.valid_only {
            conditions.push("paid = true AND end_date >= $now");
        }
        if filter.start_date_after.is_some() {
            conditions.push("start_date >= $start_date_after");
        }
        if filter.end_date_before.is_some() {
            conditions.push("end_date <= $end_date_before");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_query = format!("SELECT count() AS total FROM ticket{where_clause} GROUP ALL");
        let page_query = format!(
            "{SELECT_TICKET}{where_clause} {MOST_RECENT_FIRST} LIMIT $limit START $offset"
        );
        let pagination = filter.pagination;

        let mut builder = self
            .db
            .query(&count_query)
            .query(&page_query)
            .bind(("now", now))
            .bind(("limit", pagination.limit))
            .bind(("offset", pagination.offset));
        if let Some(after) = filter.start_date_after {
            builder = builder.bind(("start_date_after", after));
        }
        if let Some(before) = filter.end_date_before {
            builder = builder.bind(("end_date_before", before));
        }

        let mut result = builder.await.map_err(DbError::from)?;
        let count_rows: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        let rows: Vec<TicketRowWithId> = result.take(1).map_err(DbError::from)?;

        Ok(PaginatedResult {
            items: collect(rows)?,
            total: count_rows.first().map(|r| r.total).unwrap_or(0),
            offset: pagination.offset,
            limit: pagination.limit,
        })
    }
}
