//! Authentication error types.

use opp_core::error::OppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing or malformed bearer token")]
    MissingBearer,

    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(String),

    #[error("one-time code rejected: {0}")]
    OtpRejected(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("cryptography error: {0}")]
    Crypto(String),
}

impl From<AuthError> for OppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingBearer
            | AuthError::TokenExpired
            | AuthError::TokenInvalid(_)
            | AuthError::OtpRejected(_) => OppError::Authentication {
                reason: err.to_string(),
            },
            AuthError::ProviderUnavailable(msg) => OppError::Unavailable(msg),
            AuthError::Crypto(msg) => OppError::Internal(msg),
        }
    }
}
