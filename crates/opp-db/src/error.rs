//! Database-specific error types and conversions.

use std::time::Duration;

use opp_core::error::OppError;
use surrealdb::IndexedResults;

/// Text shared by the store's transaction-conflict error and the guard
/// THROWs of this crate; a statement failing with it may be re-run.
pub(crate) const RETRYABLE: &str = "can be retried";

/// Reported for every statement a failed transaction rolled back.
const NOT_EXECUTED: &str = "not executed due to a";

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Duplicate {entity}: {detail}")]
    Duplicate { entity: String, detail: String },

    #[error("{entity} references a missing record: {detail}")]
    MissingReference { entity: String, detail: String },

    #[error("Zone geometry overlaps existing zone {zone}")]
    Overlap { zone: String },

    #[error("{entity} write conflicted with a concurrent transaction: {detail}")]
    Conflict { entity: String, detail: String },

    #[error("Connection to {endpoint} timed out after {after:?}")]
    Timeout { endpoint: String, after: Duration },

    #[error("Statement on {entity} failed: {detail}")]
    Statement { entity: String, detail: String },

    #[error("Corrupt {entity} row: {detail}")]
    Decode { entity: String, detail: String },
}

impl DbError {
    /// Classify a failed statement against `entity` by the store's message.
    pub(crate) fn statement(entity: &str, err: surrealdb::Error) -> Self {
        let detail = err.to_string();
        let entity = entity.to_string();
        if detail.contains("already contains") || detail.contains("already exists") {
            DbError::Duplicate { entity, detail }
        } else if detail.contains("must conform to") && detail.contains("record::exists") {
            DbError::MissingReference { entity, detail }
        } else if detail.contains(RETRYABLE) {
            DbError::Conflict { entity, detail }
        } else {
            DbError::Statement { entity, detail }
        }
    }

    /// [`IndexedResults::check`] for a `BEGIN ... COMMIT` block. The
    /// statements a failed transaction rolled back only say so; the error
    /// classified is the first one that names the actual cause.
    pub(crate) fn check_transaction(
        entity: &str,
        mut response: IndexedResults,
    ) -> Result<IndexedResults, Self> {
        let mut errors: Vec<_> = response.take_errors().into_iter().collect();
        if errors.is_empty() {
            return Ok(response);
        }
        errors.sort_by_key(|(index, _)| *index);
        let cause = errors
            .iter()
            .position(|(_, e)| !e.to_string().contains(NOT_EXECUTED))
            .unwrap_or(0);
        let (_, err) = errors.swap_remove(cause);
        Err(Self::statement(entity, err))
    }

    pub(crate) fn decode(entity: &str, detail: impl ToString) -> Self {
        DbError::Decode {
            entity: entity.to_string(),
            detail: detail.to_string(),
        }
    }

    pub(crate) fn not_found(entity: &str, id: impl ToString) -> Self {
        DbError::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<DbError> for OppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => OppError::NotFound { entity, id },
            DbError::Duplicate { entity, .. } => OppError::AlreadyExists { entity },
            DbError::Overlap { zone } => OppError::Overlap { zone },
            DbError::MissingReference { entity, detail } => OppError::NotFound {
                entity: format!("{entity} reference"),
                id: detail,
            },
            err @ (DbError::Conflict { .. } | DbError::Timeout { .. }) => {
                OppError::Unavailable(err.to_string())
            }
            other => OppError::Database(other.to_string()),
        }
    }
}
