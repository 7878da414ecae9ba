//! Ticket pricing.
//!
//! A zone's tariff is the curve `offset + (lin * hours) ^ exp`. With
//! `exp = 1` the tariff is linear; `exp > 1` makes long stays
//! progressively more expensive.

use crate::models::zone::ZonePricing;

/// Price of a stay of `duration_minutes` under `pricing`.
///
/// Callers reject non-positive durations before pricing.
pub fn compute_price(pricing: &ZonePricing, duration_minutes: i64) -> f64 {
    let hours = duration_minutes as f64 / 60.0;
    pricing.price_offset + (pricing.price_lin * hours).powf(pricing.price_exp)
}
