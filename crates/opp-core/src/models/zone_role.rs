//! Zone-scoped role assignments.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::OppError;

/// Per-zone authority. `Admin` has full control of the zone,
/// `Controller` has operational authority (tickets, fines).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ZoneRole {
    Admin,
    Controller,
}

impl ZoneRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneRole::Admin => "admin",
            ZoneRole::Controller => "controller",
        }
    }
}

impl fmt::Display for ZoneRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ZoneRole {
    type Err = OppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(ZoneRole::Admin),
            "controller" => Ok(ZoneRole::Controller),
            other => Err(OppError::InvalidRole(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneUserRole {
    pub id: Uuid,
    pub zone_id: Uuid,
    pub username: String,
    pub role: ZoneRole,
    pub assigned_at: DateTime<Utc>,
    /// Username of whoever granted the role.
    pub assigned_by: String,
}

/// Request to grant `username` a role in a zone.
///
/// The role arrives as a free-form string from the transport and is
/// parsed into [`ZoneRole`] by the zone service, so an unsupported value
/// surfaces as [`OppError::InvalidRole`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignZoneRole {
    pub username: String,
    pub role: String,
}
