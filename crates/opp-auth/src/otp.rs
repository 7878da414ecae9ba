//! One-time-code verification for totem provisioning.

use std::time::Duration;

use serde::Serialize;
use totp_rs::{Algorithm, TOTP};
use tracing::{debug, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;

/// Checks a one-time code with whoever issued it.
pub trait OtpVerifier: Send + Sync {
    fn verify(&self, code: &str) -> impl Future<Output = Result<(), AuthError>> + Send;
}

#[derive(Serialize)]
struct OtpRequest<'a> {
    otp: &'a str,
}

/// Delegates to the identity provider's OTP endpoint: `POST {"otp": code}`,
/// where `200 OK` means the code is valid.
#[derive(Debug, Clone)]
pub struct HttpOtpVerifier {
    client: reqwest::Client,
    url: String,
}

impl HttpOtpVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self, AuthError> {
        Self::with_timeout(config.otp_url(), Duration::from_secs(config.request_timeout_secs))
    }

    pub fn with_timeout(url: String, timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;
        Ok(Self { client, url })
    }
}

impl OtpVerifier for HttpOtpVerifier {
    async fn verify(&self, code: &str) -> Result<(), AuthError> {
        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&OtpRequest { otp: code })
            .send()
            .await
            .map_err(|e| {
                warn!(url = %self.url, error = %e, "OTP endpoint unreachable");
                AuthError::ProviderUnavailable(e.to_string())
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::OK {
            debug!("OTP accepted by identity provider");
            Ok(())
        } else if status.is_server_error() {
            Err(AuthError::ProviderUnavailable(format!("OTP endpoint answered {status}")))
        } else {
            Err(AuthError::OtpRejected(status.to_string()))
        }
    }
}

/// RFC 6238 codes checked locally against a shared provisioning secret.
#[derive(Debug, Clone)]
pub struct TotpOtpVerifier {
    totp: TOTP,
}

impl TotpOtpVerifier {
    pub fn new(secret: Vec<u8>, issuer: &str, account: &str) -> Result<Self, AuthError> {
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some(issuer.to_string()),
            account.to_string(),
        )
        .map_err(|e| AuthError::Crypto(format!("TOTP init: {e}")))?;
        Ok(Self { totp })
    }

    /// Current code, for kiosk provisioning tools and tests.
    pub fn current_code(&self) -> Result<String, AuthError> {
        self.totp
            .generate_current()
            .map_err(|e| AuthError::Crypto(format!("TOTP generate: {e}")))
    }
}

impl OtpVerifier for TotpOtpVerifier {
    async fn verify(&self, code: &str) -> Result<(), AuthError> {
        let valid = self
            .totp
            .check_current(code)
            .map_err(|e| AuthError::Crypto(format!("TOTP check: {e}")))?;
        if valid {
            Ok(())
        } else {
            Err(AuthError::OtpRejected("code does not match".into()))
        }
    }
}

/// Accepts every code. Only wired in debug mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugOtpVerifier;

impl OtpVerifier for DebugOtpVerifier {
    async fn verify(&self, _code: &str) -> Result<(), AuthError> {
        debug!("Debug mode: accepting OTP without verification");
        Ok(())
    }
}

/// Verifier selected from configuration at startup.
#[derive(Debug, Clone)]
pub enum ConfiguredOtpVerifier {
    Http(HttpOtpVerifier),
    Debug(DebugOtpVerifier),
}

impl ConfiguredOtpVerifier {
    pub fn from_config(config: &AuthConfig) -> Result<Self, AuthError> {
        if config.debug_mode {
            Ok(Self::Debug(DebugOtpVerifier))
        } else {
            HttpOtpVerifier::new(config).map(Self::Http)
        }
    }
}

impl OtpVerifier for ConfiguredOtpVerifier {
    async fn verify(&self, code: &str) -> Result<(), AuthError> {
        match self {
            Self::Http(v) => v.verify(code).await,
            Self::Debug(v) => v.verify(code).await,
        }
    }
}
