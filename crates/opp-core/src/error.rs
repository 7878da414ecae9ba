//! Error types for the OPP system.
//!
//! Every layer converts its own failures into [`OppError`] so callers
//! above the core only ever see these kinds, never raw store text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OppError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity}")]
    AlreadyExists { entity: String },

    #[error("{entity} {id} is already paid")]
    AlreadyPaid { entity: String, id: String },

    #[error("Zone geometry overlaps existing zone {zone}")]
    Overlap { zone: String },

    #[error("{entity} {id} is not owned by {username}")]
    NotOwned {
        entity: String,
        id: String,
        username: String,
    },

    #[error("Invalid zone role: {0}")]
    InvalidRole(String),

    #[error("Authorization denied: {reason}")]
    Forbidden { reason: String },

    #[error("Validation error: {message}")]
    InvalidInput { message: String },

    #[error("{entity} {id} is still referenced by {referenced_by}")]
    InUse {
        entity: String,
        id: String,
        referenced_by: String,
    },

    #[error("Authentication failed: {reason}")]
    Authentication { reason: String },

    #[error("External service unavailable: {0}")]
    Unavailable(String),

    #[error("Deadline exceeded after {millis} ms")]
    DeadlineExceeded { millis: u64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type OppResult<T> = Result<T, OppError>;

impl OppError {
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        OppError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        OppError::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        OppError::InvalidInput {
            message: message.into(),
        }
    }

    /// Reference HTTP status for the transport layer.
    pub fn status_code(&self) -> u16 {
        match self {
            OppError::NotFound { .. } => 404,
            OppError::AlreadyExists { .. }
            | OppError::AlreadyPaid { .. }
            | OppError::InUse { .. } => 409,
            OppError::Forbidden { .. } | OppError::NotOwned { .. } => 403,
            OppError::Authentication { .. } => 401,
            OppError::InvalidInput { .. } | OppError::InvalidRole(_) | OppError::Overlap { .. } => {
                400
            }
            OppError::DeadlineExceeded { .. } => 504,
            OppError::Unavailable(_) => 503,
            OppError::Database(_) | OppError::Internal(_) => 500,
        }
    }
}
