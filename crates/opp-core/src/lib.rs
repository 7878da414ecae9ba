//! OPP core — domain models, error taxonomy, repository traits and the
//! pure pieces of parking logic (pricing, geometry, permission evaluation).

pub mod error;
pub mod geometry;
pub mod models;
pub mod permission;
pub mod pricing;
pub mod repository;
