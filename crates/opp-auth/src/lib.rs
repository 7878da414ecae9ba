//! OPP Auth — the consumer side of the external identity provider:
//! access-token validation and one-time-code verification.

pub mod config;
pub mod error;
pub mod otp;
pub mod token;

pub use config::AuthConfig;
pub use error::AuthError;
pub use otp::{ConfiguredOtpVerifier, DebugOtpVerifier, HttpOtpVerifier, OtpVerifier, TotpOtpVerifier};
pub use token::{AccessTokenClaims, validate_access_token};
