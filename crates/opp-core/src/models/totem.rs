//! Totem (registration kiosk) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Totem {
    /// Identifier assigned by the kiosk itself.
    pub id: String,
    pub zone_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub registration_time: DateTime<Utc>,
}

/// Self-registration request sent by a kiosk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotemRequest {
    pub id: String,
    pub zone_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// One-time code issued by the identity provider.
    pub otp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpsertTotem {
    pub id: String,
    pub zone_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}
