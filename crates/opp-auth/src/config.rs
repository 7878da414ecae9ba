//! Identity collaborator configuration.

use jsonwebtoken::Algorithm;

/// How access tokens are verified and one-time codes are checked.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// PEM-encoded public key of the identity provider. May be left empty
    /// when it is fetched from `pubkey_endpoint` at startup.
    pub jwt_public_key_pem: String,
    /// Signing algorithm the identity provider uses (default: RS512).
    pub jwt_algorithm: Algorithm,
    /// Clock skew tolerated on `exp`, in seconds.
    pub leeway_secs: u64,
    /// Base URL of the identity provider.
    pub auth_url: String,
    /// Path of the public-key endpoint, relative to `auth_url`.
    pub pubkey_endpoint: String,
    /// Path of the OTP validation endpoint, relative to `auth_url`.
    pub otp_endpoint: String,
    /// Timeout for each call to the identity provider (default: 10 s).
    pub request_timeout_secs: u64,
    /// Accept every request as `superuser_debug` and every OTP.
    /// Never enable outside development.
    pub debug_mode: bool,
}

impl AuthConfig {
    pub fn otp_url(&self) -> String {
        join_url(&self.auth_url, &self.otp_endpoint)
    }

    pub fn pubkey_url(&self) -> String {
        join_url(&self.auth_url, &self.pubkey_endpoint)
    }
}

fn join_url(base: &str, path: &str) -> String {
    match (base.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base}{}", &path[1..]),
        (false, false) if !path.is_empty() => format!("{base}/{path}"),
        _ => format!("{base}{path}"),
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_public_key_pem: String::new(),
            jwt_algorithm: Algorithm::RS512,
            leeway_secs: 0,
            auth_url: "http://127.0.0.1:8080".into(),
            pubkey_endpoint: "/pubkey".into(),
            otp_endpoint: "/otp/validate".into(),
            request_timeout_secs: 10,
            debug_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_join_with_single_slash() {
        let config = AuthConfig {
            auth_url: "http://auth:9000/".into(),
            otp_endpoint: "/otp".into(),
            pubkey_endpoint: "keys".into(),
            ..Default::default()
        };
        assert_eq!(config.otp_url(), "http://auth:9000/otp");
        assert_eq!(config.pubkey_url(), "http://auth:9000/keys");
    }
}
