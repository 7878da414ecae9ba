//! Domain models for OPP.
//!
//! These are the core types shared across all crates.

pub mod car;
pub mod fine;
pub mod ticket;
pub mod totem;
pub mod user;
pub mod zone;
pub mod zone_role;
