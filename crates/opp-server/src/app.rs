//! The assembled service graph shared by every request.

use std::time::Duration;

use opp_auth::otp::OtpVerifier;
use opp_auth::token::{bearer_token, validate_access_token};
use opp_auth::AuthConfig;
use opp_core::error::OppResult;
use opp_core::models::user::Subject;
use opp_db::repository::{
    SurrealCarRepository, SurrealFineRepository, SurrealTicketRepository, SurrealTotemRepository,
    SurrealUserRepository, SurrealZoneRepository, SurrealZoneRoleRepository,
};
use opp_service::deadline;
use opp_service::{CarService, FineService, TicketService, TotemService, UserService, ZoneService};
use surrealdb::{Connection, Surreal};

type Zones<C> = SurrealZoneRepository<C>;
type Roles<C> = SurrealZoneRoleRepository<C>;
type Cars<C> = SurrealCarRepository<C>;
type Users<C> = SurrealUserRepository<C>;

/// Every lifecycle manager, wired to one store handle.
pub struct App<C: Connection, O: OtpVerifier> {
    pub zones: ZoneService<Zones<C>, Roles<C>, Users<C>>,
    pub tickets: TicketService<SurrealTicketRepository<C>, Zones<C>, Cars<C>, Roles<C>>,
    pub fines: FineService<SurrealFineRepository<C>, Zones<C>, Cars<C>, Roles<C>>,
    pub totems: TotemService<SurrealTotemRepository<C>, Zones<C>, Roles<C>, O>,
    pub cars: CarService<Cars<C>>,
    pub users: UserService<Users<C>>,
    auth: AuthConfig,
    operation_timeout: Duration,
}

impl<C: Connection, O: OtpVerifier> App<C, O> {
    pub fn new(
        db: Surreal<C>,
        auth: AuthConfig,
        otp: O,
        password_pepper: Option<String>,
        operation_timeout: Duration,
    ) -> Self {
        let users = || match &password_pepper {
            Some(pepper) => SurrealUserRepository::with_pepper(db.clone(), pepper.clone()),
            None => SurrealUserRepository::new(db.clone()),
        };

        Self {
            zones: ZoneService::new(
                SurrealZoneRepository::new(db.clone()),
                SurrealZoneRoleRepository::new(db.clone()),
                users(),
            ),
            tickets: TicketService::new(
                SurrealTicketRepository::new(db.clone()),
                SurrealZoneRepository::new(db.clone()),
                SurrealCarRepository::new(db.clone()),
                SurrealZoneRoleRepository::new(db.clone()),
            ),
            fines: FineService::new(
                SurrealFineRepository::new(db.clone()),
                SurrealZoneRepository::new(db.clone()),
                SurrealCarRepository::new(db.clone()),
                SurrealZoneRoleRepository::new(db.clone()),
            ),
            totems: TotemService::new(
                SurrealTotemRepository::new(db.clone()),
                SurrealZoneRepository::new(db.clone()),
                SurrealZoneRoleRepository::new(db.clone()),
                otp,
            ),
            cars: CarService::new(SurrealCarRepository::new(db.clone())),
            users: UserService::new(users()),
            auth,
            operation_timeout,
        }
    }

    /// Resolve the caller from an `Authorization` header value.
    pub fn authenticate(&self, authorization: &str) -> OppResult<Subject> {
        let token = if self.auth.debug_mode {
            ""
        } else {
            bearer_token(authorization)?
        };
        Ok(validate_access_token(token, &self.auth)?)
    }

    /// Run one service operation under the configured deadline.
    pub async fn run<T>(&self, operation: impl Future<Output = OppResult<T>>) -> OppResult<T> {
        deadline::within(self.operation_timeout, operation).await
    }
}
