//! Zone domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::geometry::ZoneGeometry;

/// Coefficients of a zone's tariff curve, see [`crate::pricing`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZonePricing {
    pub price_offset: f64,
    pub price_lin: f64,
    pub price_exp: f64,
}

/// A geofenced parking area with its own pricing curve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: Uuid,
    pub name: String,
    pub available: bool,
    pub geometry: ZoneGeometry,
    /// Arbitrary key-value metadata.
    pub metadata: serde_json::Value,
    #[serde(flatten)]
    pub pricing: ZonePricing,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateZone {
    pub name: String,
    pub available: bool,
    pub geometry: ZoneGeometry,
    pub metadata: Option<serde_json::Value>,
    #[serde(flatten)]
    pub pricing: ZonePricing,
}

/// Partial update; `None` leaves the field unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateZone {
    pub name: Option<String>,
    pub available: Option<bool>,
    pub geometry: Option<ZoneGeometry>,
    pub metadata: Option<serde_json::Value>,
    pub pricing: Option<ZonePricing>,
}
