//! SurrealDB repository implementations.

use surrealdb_types::SurrealValue;
use tracing::debug;

use crate::error::DbError;

mod car;
mod fine;
mod ticket;
mod totem;
mod user;
mod zone;
mod zone_role;

pub use car::SurrealCarRepository;
pub use fine::SurrealFineRepository;
pub use ticket::SurrealTicketRepository;
pub use totem::SurrealTotemRepository;
pub use user::{SurrealUserRepository, verify_password};
pub use zone::SurrealZoneRepository;
pub use zone_role::SurrealZoneRoleRepository;

/// Row struct for count queries.
#[derive(Debug, SurrealValue)]
pub(crate) struct CountRow {
    pub(crate) total: u64,
}

/// Attempts given to a transaction that keeps losing write conflicts.
const CONFLICT_ATTEMPTS: u32 = 5;

/// Run `attempt` until it stops failing with [`DbError::Conflict`], at
/// most [`CONFLICT_ATTEMPTS`] times. Each attempt must re-read whatever
/// state it checks.
pub(crate) async fn retry_conflicts<T, F, Fut>(entity: &str, mut attempt: F) -> Result<T, DbError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut tries = 1;
    loop {
        match attempt().await {
            Err(DbError::Conflict { detail, .. }) if tries < CONFLICT_ATTEMPTS => {
                debug!(entity, attempt = tries, %detail, "Write conflict, retrying");
                tries += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> DbError {
        DbError::Conflict {
            entity: "zone".into(),
            detail: "This transaction can be retried".into(),
        }
    }

    #[tokio::test]
    async fn conflicts_are_retried_until_success() {
        let mut calls = 0;
        let result = retry_conflicts("zone", || {
            calls += 1;
            let outcome = if calls < 3 { Err(conflict()) } else { Ok(calls) };
            async move { outcome }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn other_errors_and_exhaustion_stop_retrying() {
        let mut calls = 0;
        let err = retry_conflicts("zone", || {
            calls += 1;
            async { Err::<(), _>(DbError::not_found("zone", "z1")) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }), "got: {err:?}");
        assert_eq!(calls, 1);

        let mut calls = 0;
        let err = retry_conflicts("zone", || {
            calls += 1;
            async { Err::<(), _>(conflict()) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, DbError::Conflict { .. }), "got: {err:?}");
        assert_eq!(calls, CONFLICT_ATTEMPTS);
    }
}
