//! Ticket lifecycle: validation, pricing, payment and guarded deletion.

use chrono::{DateTime, Duration, Utc};
use opp_core::error::{OppError, OppResult};
use opp_core::models::car::normalize_plate;
use opp_core::models::ticket::{CreateTicket, Ticket, TicketFilter, TicketRequest};
use opp_core::models::user::{GlobalRole, Subject};
use opp_core::permission::{Capability, authorize, require_global};
use opp_core::pricing::compute_price;
use opp_core::repository::{
    CarRepository, PaginatedResult, Pagination, TicketRepository, ZoneRepository,
    ZoneRoleRepository,
};
use tracing::info;
use uuid::Uuid;

/// Ticket service.
///
/// A ticket moves from unpaid to paid exactly once. Only an unpaid ticket
/// can be deleted, and only by the owner of its car or a global admin.
pub struct TicketService<T, Z, C, R>
where
    T: TicketRepository,
    Z: ZoneRepository,
    C: CarRepository,
    R: ZoneRoleRepository,
{
    tickets: T,
    zones: Z,
    cars: C,
    roles: R,
}

impl<T, Z, C, R> TicketService<T, Z, C, R>
where
    T: TicketRepository,
    Z: ZoneRepository,
    C: CarRepository,
    R: ZoneRoleRepository,
{
    pub fn new(tickets: T, zones: Z, cars: C, roles: R) -> Self {
        Self {
            tickets,
            zones,
            cars,
            roles,
        }
    }

    /// Check the time window of a request and that its zone exists.
    pub async fn validate_ticket_request(&self, request: &TicketRequest) -> OppResult<()> {
        check_window(request, Utc::now())?;
        if !self.zones.exists(request.zone_id).await? {
            return Err(OppError::not_found("zone", request.zone_id));
        }
        Ok(())
    }

    /// Issue a ticket in `zone_id`, priced from the zone's tariff.
    pub async fn create_zone_ticket(
        &self,
        subject: &Subject,
        zone_id: Uuid,
        request: TicketRequest,
    ) -> OppResult<Ticket> {
        if request.zone_id != zone_id {
            return Err(OppError::invalid_input(format!(
                "ticket request targets zone {} but was sent to zone {zone_id}",
                request.zone_id
            )));
        }

        // 1. Window and zone existence.
        self.validate_ticket_request(&request).await?;
        let start_date = request.start_date;
        let end_date = end_of(start_date, request.duration)?;

        // 2. Zone must accept new tickets.
        let zone = self.zones.get_by_id(zone_id).await?;
        if !zone.available {
            return Err(OppError::invalid_input(format!(
                "zone {} is not accepting tickets",
                zone.name
            )));
        }

        // 3. The car must exist and belong to the requester, unless staff.
        let plate = normalize_plate(&request.plate);
        let car = self.cars.get(&plate).await?;
        if car.owner != subject.username && !subject.role.is_staff() {
            return Err(OppError::NotOwned {
                entity: "car".into(),
                id: plate,
                username: subject.username.clone(),
            });
        }

        // 4. Price once; never recomputed afterwards.
        let price = compute_price(&zone.pricing, request.duration);

        let ticket = self
            .tickets
            .create(CreateTicket {
                plate: car.plate,
                zone_id,
                start_date,
                end_date,
                price,
            })
            .await?;
        info!(
            ticket_id = %ticket.id,
            zone_id = %zone_id,
            plate = %ticket.plate,
            price = ticket.price,
            "Ticket created"
        );
        Ok(ticket)
    }

    pub async fn pay_ticket(&self, subject: &Subject, id: Uuid) -> OppResult<Ticket> {
        let ticket = self.tickets.pay(id).await?;
        info!(ticket_id = %id, by = %subject.username, "Ticket paid");
        Ok(ticket)
    }

    /// Delete an unpaid ticket. A paid ticket is refused for everyone,
    /// admins included.
    pub async fn delete_ticket(&self, subject: &Subject, id: Uuid) -> OppResult<()> {
        let ticket = self.tickets.get_by_id(id).await?;
        if ticket.paid {
            return Err(OppError::AlreadyPaid {
                entity: "ticket".into(),
                id: id.to_string(),
            });
        }

        if !subject.role.is_admin() {
            let car = self.cars.get(&ticket.plate).await?;
            if car.owner != subject.username {
                return Err(OppError::NotOwned {
                    entity: "ticket".into(),
                    id: id.to_string(),
                    username: subject.username.clone(),
                });
            }
        }

        self.tickets.delete_unpaid(id).await?;
        info!(ticket_id = %id, by = %subject.username, "Ticket deleted");
        Ok(())
    }

    /// Tickets for every car of the caller. With `valid_only`, only paid
    /// tickets that have not yet ended.
    pub async fn user_tickets(&self, subject: &Subject, valid_only: bool) -> OppResult<Vec<Ticket>> {
        self.tickets
            .list_by_owner(&subject.username, valid_only, Utc::now())
            .await
    }

    /// Tickets issued in a zone, most recent first.
    pub async fn zone_tickets(
        &self,
        subject: &Subject,
        zone_id: Uuid,
        pagination: Pagination,
    ) -> OppResult<PaginatedResult<Ticket>> {
        if !self.zones.exists(zone_id).await? {
            return Err(OppError::not_found("zone", zone_id));
        }
        authorize(&self.roles, subject, zone_id, Capability::ZoneControllerAction).await?;
        self.tickets.list_by_zone(zone_id, pagination).await
    }

    pub async fn get_ticket(&self, subject: &Subject, id: Uuid) -> OppResult<Ticket> {
        require_global(subject, GlobalRole::is_admin, "read tickets by id")?;
        self.tickets.get_by_id(id).await
    }

    pub async fn list_tickets(
        &self,
        subject: &Subject,
        filter: TicketFilter,
    ) -> OppResult<PaginatedResult<Ticket>> {
        require_global(subject, GlobalRole::is_admin, "list tickets")?;
        self.tickets.list(filter, Utc::now()).await
    }

    pub async fn car_tickets(&self, subject: &Subject, plate: &str) -> OppResult<Vec<Ticket>> {
        let plate = normalize_plate(plate);
        let car = self.cars.get(&plate).await?;
        if car.owner != subject.username && !subject.role.is_staff() {
            return Err(OppError::NotOwned {
                entity: "car".into(),
                id: plate,
                username: subject.username.clone(),
            });
        }
        self.tickets.list_by_plate(&plate).await
    }
}

/// Window rules of a ticket request evaluated at `now`.
pub fn check_window(request: &TicketRequest, now: DateTime<Utc>) -> OppResult<()> {
    if request.duration <= 0 {
        return Err(OppError::invalid_input("duration must be greater than zero"));
    }
    if request.start_date <= now {
        return Err(OppError::invalid_input("start_date must be in the future"));
    }
    if end_of(request.start_date, request.duration)? <= now {
        return Err(OppError::invalid_input("end_date must be in the future"));
    }
    Ok(())
}

fn end_of(start: DateTime<Utc>, duration_minutes: i64) -> OppResult<DateTime<Utc>> {
    Duration::try_minutes(duration_minutes)
        .and_then(|d| start.checked_add_signed(d))
        .ok_or_else(|| OppError::invalid_input("duration is out of range"))
}
