//! User domain model and global roles.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::OppError;

/// Account-wide authority tier.
///
/// Fine-grained authority over a single zone comes from
/// [`ZoneRole`](crate::models::zone_role::ZoneRole) assignments instead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GlobalRole {
    Superuser,
    Admin,
    Controller,
    User,
}

impl GlobalRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalRole::Superuser => "superuser",
            GlobalRole::Admin => "admin",
            GlobalRole::Controller => "controller",
            GlobalRole::User => "user",
        }
    }

    /// Superuser or admin.
    pub fn is_admin(&self) -> bool {
        matches!(self, GlobalRole::Superuser | GlobalRole::Admin)
    }

    /// Any operator role: superuser, admin or controller.
    pub fn is_staff(&self) -> bool {
        !matches!(self, GlobalRole::User)
    }
}

impl fmt::Display for GlobalRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GlobalRole {
    type Err = OppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "superuser" => Ok(GlobalRole::Superuser),
            "admin" => Ok(GlobalRole::Admin),
            "controller" => Ok(GlobalRole::Controller),
            "user" => Ok(GlobalRole::User),
            other => Err(OppError::invalid_input(format!(
                "unknown global role: {other}"
            ))),
        }
    }
}

/// The authenticated caller of an operation, as resolved by the
/// identity collaborator before any core operation begins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub username: String,
    pub role: GlobalRole,
}

impl Subject {
    pub fn new(username: impl Into<String>, role: GlobalRole) -> Self {
        Self {
            username: username.into(),
            role,
        }
    }

    pub fn is_superuser(&self) -> bool {
        self.role == GlobalRole::Superuser
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    /// Argon2id PHC string; never the raw credential.
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: GlobalRole,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    /// Raw password (hashed with Argon2id before storage).
    pub password: String,
    pub role: GlobalRole,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateUser {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_string_roundtrip() {
        for role in [
            GlobalRole::Superuser,
            GlobalRole::Admin,
            GlobalRole::Controller,
            GlobalRole::User,
        ] {
            assert_eq!(role.as_str().parse::<GlobalRole>().unwrap(), role);
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(matches!(
            "root".parse::<GlobalRole>(),
            Err(OppError::InvalidInput { .. })
        ));
    }

    #[test]
    fn role_tiers() {
        assert!(GlobalRole::Superuser.is_admin());
        assert!(GlobalRole::Admin.is_admin());
        assert!(!GlobalRole::Controller.is_admin());
        assert!(GlobalRole::Controller.is_staff());
        assert!(!GlobalRole::User.is_staff());
    }
}
