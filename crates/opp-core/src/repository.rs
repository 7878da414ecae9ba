//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. Implementations translate store
//! failures into [`OppError`](crate::error::OppError) kinds so services
//! never inspect raw store text.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::OppResult;
use crate::models::{
    car::{Car, CreateCar, UpdateCar},
    fine::{CreateFine, Fine},
    ticket::{CreateTicket, Ticket, TicketFilter},
    totem::{Totem, UpsertTotem},
    user::{CreateUser, UpdateUser, User},
    zone::{CreateZone, UpdateZone, Zone},
    zone_role::{ZoneRole, ZoneUserRole},
};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(offset: u64, limit: u64) -> Self {
        Self { offset, limit }
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: 20,
        }
    }
}

/// A paginated result set.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
}

// ---------------------------------------------------------------------------
// Zones
// ---------------------------------------------------------------------------

pub trait ZoneRepository: Send + Sync {
    /// Insert a zone and grant `creator` the admin role on it atomically.
    /// Fails with `Overlap` when the geometry overlaps another zone.
    fn create(
        &self,
        input: CreateZone,
        creator: &str,
    ) -> impl Future<Output = OppResult<Zone>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = OppResult<Zone>> + Send;
    fn get_by_name(&self, name: &str) -> impl Future<Output = OppResult<Zone>> + Send;
    fn list_all(&self) -> impl Future<Output = OppResult<Vec<Zone>>> + Send;
    fn update(
        &self,
        id: Uuid,
        input: UpdateZone,
    ) -> impl Future<Output = OppResult<Zone>> + Send;
    /// Removes the zone with its role assignments and totems. Fails with
    /// `InUse` while tickets or fines reference it.
    fn delete(&self, id: Uuid) -> impl Future<Output = OppResult<()>> + Send;
    fn find_containing(
        &self,
        longitude: f64,
        latitude: f64,
    ) -> impl Future<Output = OppResult<Vec<Zone>>> + Send;
    /// The oldest zone containing the point.
    fn first_containing(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> impl Future<Output = OppResult<Zone>> + Send;
    fn exists(&self, id: Uuid) -> impl Future<Output = OppResult<bool>> + Send;
}

pub trait ZoneRoleRepository: Send + Sync {
    fn assign(
        &self,
        zone_id: Uuid,
        username: &str,
        role: ZoneRole,
        assigned_by: &str,
    ) -> impl Future<Output = OppResult<ZoneUserRole>> + Send;
    fn find(
        &self,
        zone_id: Uuid,
        username: &str,
    ) -> impl Future<Output = OppResult<Option<ZoneUserRole>>> + Send;
    fn remove(&self, zone_id: Uuid, username: &str) -> impl Future<Output = OppResult<()>> + Send;
    fn list_by_zone(
        &self,
        zone_id: Uuid,
    ) -> impl Future<Output = OppResult<Vec<ZoneUserRole>>> + Send;
    /// Zones in which `username` holds any role.
    fn zones_for_user(&self, username: &str) -> impl Future<Output = OppResult<Vec<Zone>>> + Send;
}

// ---------------------------------------------------------------------------
// Cars & users
// ---------------------------------------------------------------------------

pub trait CarRepository: Send + Sync {
    fn create(&self, owner: &str, input: CreateCar) -> impl Future<Output = OppResult<Car>> + Send;
    fn get(&self, plate: &str) -> impl Future<Output = OppResult<Car>> + Send;
    fn exists(&self, plate: &str) -> impl Future<Output = OppResult<bool>> + Send;
    /// Updates only when `owner` owns the car; `NotFound` otherwise.
    fn update(
        &self,
        owner: &str,
        plate: &str,
        input: UpdateCar,
    ) -> impl Future<Output = OppResult<Car>> + Send;
    /// Deletes only when `owner` owns the car; `NotFound` otherwise.
    fn delete(&self, owner: &str, plate: &str) -> impl Future<Output = OppResult<()>> + Send;
    /// Cars of `owner`; with `currently_parked`, only those holding a paid
    /// ticket that has not ended at `now`.
    fn list_by_owner(
        &self,
        owner: &str,
        currently_parked: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OppResult<Vec<Car>>> + Send;
    fn list(
        &self,
        pagination: Pagination,
        currently_parked: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OppResult<PaginatedResult<Car>>> + Send;
    /// Deletes every car no ticket or fine refers to; returns the count.
    fn delete_all(&self) -> impl Future<Output = OppResult<u64>> + Send;
}

pub trait UserRepository: Send + Sync {
    fn create(&self, input: CreateUser) -> impl Future<Output = OppResult<User>> + Send;
    fn get(&self, username: &str) -> impl Future<Output = OppResult<User>> + Send;
    fn exists(&self, username: &str) -> impl Future<Output = OppResult<bool>> + Send;
    fn update(
        &self,
        username: &str,
        input: UpdateUser,
    ) -> impl Future<Output = OppResult<User>> + Send;
    fn delete(&self, username: &str) -> impl Future<Output = OppResult<()>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OppResult<PaginatedResult<User>>> + Send;
}

// ---------------------------------------------------------------------------
// Tickets & fines
// ---------------------------------------------------------------------------

pub trait TicketRepository: Send + Sync {
    fn create(&self, input: CreateTicket) -> impl Future<Output = OppResult<Ticket>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = OppResult<Ticket>> + Send;
    /// Marks an unpaid ticket paid. `AlreadyPaid` when it was paid before.
    fn pay(&self, id: Uuid) -> impl Future<Output = OppResult<Ticket>> + Send;
    /// Deletes an unpaid ticket. `AlreadyPaid` when it has been paid.
    fn delete_unpaid(&self, id: Uuid) -> impl Future<Output = OppResult<()>> + Send;
    /// Tickets of every car owned by `owner`, valid at `now` if `valid_only`.
    fn list_by_owner(
        &self,
        owner: &str,
        valid_only: bool,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OppResult<Vec<Ticket>>> + Send;
    fn list_by_plate(&self, plate: &str) -> impl Future<Output = OppResult<Vec<Ticket>>> + Send;
    /// Most recent first.
    fn list_by_zone(
        &self,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = OppResult<PaginatedResult<Ticket>>> + Send;
    fn list(
        &self,
        filter: TicketFilter,
        now: DateTime<Utc>,
    ) -> impl Future<Output = OppResult<PaginatedResult<Ticket>>> + Send;
}

pub trait FineRepository: Send + Sync {
    fn create(&self, input: CreateFine) -> impl Future<Output = OppResult<Fine>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = OppResult<Fine>> + Send;
    /// Marks an unpaid fine paid. `AlreadyPaid` when it was paid before.
    fn pay(&self, id: Uuid) -> impl Future<Output = OppResult<Fine>> + Send;
    /// Deletes an unpaid fine. `AlreadyPaid` when it has been paid.
    fn delete_unpaid(&self, id: Uuid) -> impl Future<Output = OppResult<()>> + Send;
    fn delete_all(&self) -> impl Future<Output = OppResult<u64>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OppResult<PaginatedResult<Fine>>> + Send;
    fn list_by_plate(&self, plate: &str) -> impl Future<Output = OppResult<Vec<Fine>>> + Send;
    fn list_by_owner(&self, owner: &str) -> impl Future<Output = OppResult<Vec<Fine>>> + Send;
    fn list_by_zone(
        &self,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> impl Future<Output = OppResult<PaginatedResult<Fine>>> + Send;
}

// ---------------------------------------------------------------------------
// Totems
// ---------------------------------------------------------------------------

pub trait TotemRepository: Send + Sync {
    /// Insert, or refresh zone, location and registration time of an
    /// existing totem with the same id.
    fn upsert(&self, input: UpsertTotem) -> impl Future<Output = OppResult<Totem>> + Send;
    fn get_by_id(&self, id: &str) -> impl Future<Output = OppResult<Totem>> + Send;
    fn list(
        &self,
        pagination: Pagination,
    ) -> impl Future<Output = OppResult<PaginatedResult<Totem>>> + Send;
    fn delete(&self, id: &str) -> impl Future<Output = OppResult<()>> + Send;
}
