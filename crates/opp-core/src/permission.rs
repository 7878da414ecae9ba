//! Zone-scoped authorization.
//!
//! Every zone-scoped operation is decided here by crossing the subject's
//! global role with its role in the target zone. A zone admin holds every
//! controller capability.

use uuid::Uuid;

use crate::error::{OppError, OppResult};
use crate::models::user::{GlobalRole, Subject};
use crate::models::zone_role::ZoneRole;
use crate::repository::ZoneRoleRepository;

/// A capability required on a specific zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Manage the zone itself and its controllers.
    ZoneAdminAction,
    /// Operate within the zone: issue fines, read tickets.
    ZoneControllerAction,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::ZoneAdminAction => "zone-admin-action",
            Capability::ZoneControllerAction => "zone-controller-action",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// The subject holds no role in the zone.
    DenyNoRole,
    /// The subject's zone role is too weak for the capability.
    DenyInsufficientRole,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Pure decision over an already resolved zone role.
pub fn evaluate(subject: &Subject, zone_role: Option<ZoneRole>, capability: Capability) -> Decision {
    if subject.role == GlobalRole::Superuser {
        return Decision::Allow;
    }
    let Some(role) = zone_role else {
        return Decision::DenyNoRole;
    };
    let allowed = match capability {
        Capability::ZoneAdminAction => role == ZoneRole::Admin,
        Capability::ZoneControllerAction => matches!(role, ZoneRole::Admin | ZoneRole::Controller),
    };
    if allowed {
        Decision::Allow
    } else {
        Decision::DenyInsufficientRole
    }
}

/// Resolve the subject's role in `zone_id` and apply [`evaluate`].
///
/// Superusers are allowed without touching the store. A failed lookup is
/// returned as-is and never reported as a denial.
pub async fn authorize<R: ZoneRoleRepository>(
    roles: &R,
    subject: &Subject,
    zone_id: Uuid,
    capability: Capability,
) -> OppResult<()> {
    if subject.is_superuser() {
        return Ok(());
    }
    let role = roles
        .find(zone_id, &subject.username)
        .await?
        .map(|assignment| assignment.role);
    match evaluate(subject, role, capability) {
        Decision::Allow => Ok(()),
        Decision::DenyNoRole => Err(OppError::forbidden(format!(
            "{} has no role in zone {zone_id}",
            subject.username
        ))),
        Decision::DenyInsufficientRole => Err(OppError::forbidden(format!(
            "{} lacks {} on zone {zone_id}",
            subject.username,
            capability.as_str()
        ))),
    }
}

/// Gate for operations decided on the global role alone.
pub fn require_global(
    subject: &Subject,
    allowed: impl Fn(&GlobalRole) -> bool,
    action: &str,
) -> OppResult<()> {
    if allowed(&subject.role) {
        Ok(())
    } else {
        Err(OppError::forbidden(format!(
            "{} ({}) may not {action}",
            subject.username, subject.role
        )))
    }
}
