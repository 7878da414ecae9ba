//! Lifecycle managers for OPP.
//!
//! Each service is generic over the repository traits of `opp-core` and
//! applies the authorization, validation and ordering rules of one
//! aggregate before delegating persistence to the store.

pub mod car;
pub mod deadline;
pub mod fine;
pub mod ticket;
pub mod totem;
pub mod user;
pub mod zone;

pub use car::CarService;
pub use fine::FineService;
pub use ticket::TicketService;
pub use totem::TotemService;
pub use user::UserService;
pub use zone::ZoneService;
