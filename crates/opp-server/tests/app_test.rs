//! Service graph wiring over in-memory SurrealDB.

use std::time::Duration;

use opp_auth::{AuthConfig, DebugOtpVerifier};
use opp_core::error::OppError;
use opp_core::geometry::ZoneGeometry;
use opp_core::models::user::GlobalRole;
use opp_core::models::zone::{CreateZone, ZonePricing};
use opp_server::App;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};

async fn app(debug_mode: bool) -> App<Db, DebugOtpVerifier> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    opp_db::run_migrations(&db).await.unwrap();

    let auth = AuthConfig {
        debug_mode,
        ..AuthConfig::default()
    };
    App::new(db, auth, DebugOtpVerifier, None, Duration::from_secs(5))
}

#[tokio::test]
async fn debug_mode_acts_as_superuser() {
    let app = app(true).await;
    let subject = app.authenticate("").unwrap();
    assert_eq!(subject.username, "superuser_debug");
    assert_eq!(subject.role, GlobalRole::Superuser);

    let geometry = ZoneGeometry::from_rings(
        &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
        &[],
    )
    .unwrap();
    let zone = app
        .run(app.zones.create_zone(
            &subject,
            CreateZone {
                name: "centro".into(),
                available: true,
                geometry,
                metadata: None,
                pricing: ZonePricing {
                    price_offset: 0.5,
                    price_lin: 1.0,
                    price_exp: 1.0,
                },
            },
        ))
        .await
        .unwrap();
    assert_eq!(app.run(app.zones.list_zones()).await.unwrap().len(), 1);
    assert_eq!(zone.pricing.price_offset, 0.5);
}

#[tokio::test]
async fn missing_bearer_is_unauthenticated() {
    let app = app(false).await;
    let err = app.authenticate("Basic abc").unwrap_err();
    assert!(
        matches!(err, OppError::Authentication { .. }),
        "expected Authentication, got: {err:?}"
    );

    let err = app.authenticate("Bearer not-a-jwt").unwrap_err();
    assert!(
        matches!(err, OppError::Authentication { .. } | OppError::Internal(_)),
        "got: {err:?}"
    );
}
