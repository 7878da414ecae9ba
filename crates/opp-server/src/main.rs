//! OPP Server — application entry point.

use anyhow::Context;
use clap::Parser;
use opp_auth::ConfiguredOtpVerifier;
use opp_auth::token::fetch_public_key;
use opp_db::DbManager;
use opp_server::{App, ServerConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("opp=info"));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();

    let config = ServerConfig::parse();
    info!("Starting OPP server...");

    let db = DbManager::connect_and_migrate(&config.db_config())
        .await
        .context("database bootstrap failed")?;

    let mut auth = config.auth_config()?;
    if auth.debug_mode {
        warn!("Debug mode enabled: access tokens and OTPs are not verified");
    } else if auth.jwt_public_key_pem.is_empty() {
        auth.jwt_public_key_pem = fetch_public_key(&auth)
            .await
            .context("could not obtain the identity provider public key")?;
    }
    let otp = ConfiguredOtpVerifier::from_config(&auth).context("OTP verifier setup failed")?;

    let app = App::new(
        db.client().clone(),
        auth,
        otp,
        config.password_pepper.clone(),
        config.operation_timeout(),
    );
    let zones = app.run(app.zones.list_zones()).await?;
    info!(zones = zones.len(), "OPP server ready");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("OPP server stopped.");
    Ok(())
}
