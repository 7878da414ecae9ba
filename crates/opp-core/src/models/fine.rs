//! Fine domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A penalty charge against a car, issued within a zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fine {
    pub id: Uuid,
    pub plate: String,
    pub zone_id: Uuid,
    pub amount: f64,
    pub date: DateTime<Utc>,
    pub paid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineRequest {
    pub zone_id: Uuid,
    pub amount: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFine {
    pub plate: String,
    pub zone_id: Uuid,
    pub amount: f64,
}
