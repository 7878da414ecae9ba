//! Command-line and environment configuration.

use std::time::Duration;

use clap::Parser;
use jsonwebtoken::Algorithm;
use opp_auth::AuthConfig;
use opp_db::DbConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "opp-server", version, about = "OPP parking backend")]
pub struct ServerConfig {
    /// SurrealDB WebSocket address.
    #[arg(long, env = "OPP_DB_URL", default_value = "127.0.0.1:8000")]
    pub db_url: String,

    #[arg(long, env = "OPP_DB_NAMESPACE", default_value = "opp")]
    pub db_namespace: String,

    #[arg(long, env = "OPP_DB_DATABASE", default_value = "parking")]
    pub db_database: String,

    #[arg(long, env = "OPP_DB_USER", default_value = "root")]
    pub db_user: String,

    #[arg(long, env = "OPP_DB_PASSWORD", default_value = "root", hide_env_values = true)]
    pub db_password: String,

    /// Seconds allowed for connecting to the store.
    #[arg(long, env = "OPP_DB_CONNECT_TIMEOUT", default_value_t = 10)]
    pub db_connect_timeout: u64,

    /// Base URL of the identity provider.
    #[arg(long, env = "AUTH_URL", default_value = "http://127.0.0.1:8080")]
    pub auth_url: String,

    #[arg(long, env = "OTP_ENDPOINT", default_value = "/otp/validate")]
    pub otp_endpoint: String,

    #[arg(long, env = "PUBKEY_ENDPOINT", default_value = "/pubkey")]
    pub pubkey_endpoint: String,

    /// PEM public key for access tokens. Fetched from the identity
    /// provider when empty.
    #[arg(long, env = "JWT_PUBLIC_KEY", default_value = "", hide_env_values = true)]
    pub jwt_public_key: String,

    #[arg(long, env = "JWT_ALGORITHM", default_value = "RS512")]
    pub jwt_algorithm: String,

    /// Seconds allowed for each identity provider request.
    #[arg(long, env = "AUTH_TIMEOUT", default_value_t = 10)]
    pub auth_timeout: u64,

    /// Optional server-side pepper mixed into password hashes.
    #[arg(long, env = "OPP_PASSWORD_PEPPER", hide_env_values = true)]
    pub password_pepper: Option<String>,

    /// Skip token and OTP verification. Development only.
    #[arg(long, env = "DEBUG_MODE", default_value_t = false)]
    pub debug_mode: bool,

    /// Upper bound for a single service operation, in milliseconds.
    #[arg(long, env = "OPP_OPERATION_TIMEOUT_MS", default_value_t = 5_000)]
    pub operation_timeout_ms: u64,
}

impl ServerConfig {
    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            url: self.db_url.clone(),
            namespace: self.db_namespace.clone(),
            database: self.db_database.clone(),
            username: self.db_user.clone(),
            password: self.db_password.clone(),
            connect_timeout: Duration::from_secs(self.db_connect_timeout),
        }
    }

    pub fn auth_config(&self) -> anyhow::Result<AuthConfig> {
        let jwt_algorithm: Algorithm = self
            .jwt_algorithm
            .parse()
            .map_err(|e| anyhow::anyhow!("unsupported JWT algorithm '{}': {e}", self.jwt_algorithm))?;
        Ok(AuthConfig {
            jwt_public_key_pem: self.jwt_public_key.clone(),
            jwt_algorithm,
            auth_url: self.auth_url.clone(),
            pubkey_endpoint: self.pubkey_endpoint.clone(),
            otp_endpoint: self.otp_endpoint.clone(),
            request_timeout_secs: self.auth_timeout,
            debug_mode: self.debug_mode,
            ..AuthConfig::default()
        })
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_overrides() {
        let config = ServerConfig::parse_from([
            "opp-server",
            "--db-url",
            "db.internal:8000",
            "--jwt-algorithm",
            "EdDSA",
            "--debug-mode",
        ]);
        assert_eq!(config.db_config().url, "db.internal:8000");
        assert_eq!(config.db_config().namespace, "opp");

        let auth = config.auth_config().unwrap();
        assert_eq!(auth.jwt_algorithm, Algorithm::EdDSA);
        assert!(auth.debug_mode);
        assert_eq!(auth.otp_url(), "http://127.0.0.1:8080/otp/validate");
        assert_eq!(config.operation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        let config = ServerConfig::parse_from(["opp-server", "--jwt-algorithm", "XX999"]);
        assert!(config.auth_config().is_err());
    }
}
