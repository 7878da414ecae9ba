//! Zone registry and zone-role authorization through the service layer,
//! backed by in-memory SurrealDB.

use opp_core::error::OppError;
use opp_core::geometry::ZoneGeometry;
use opp_core::models::user::{CreateUser, GlobalRole, Subject};
use opp_core::models::zone::{CreateZone, UpdateZone, Zone, ZonePricing};
use opp_core::models::zone_role::{AssignZoneRole, ZoneRole};
use opp_core::repository::UserRepository;
use opp_db::repository::{
    SurrealUserRepository, SurrealZoneRepository, SurrealZoneRoleRepository,
};
use opp_service::ZoneService;
use serde_json::json;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

type Zones =
    ZoneService<SurrealZoneRepository<Db>, SurrealZoneRoleRepository<Db>, SurrealUserRepository<Db>>;

fn root() -> Subject {
    Subject::new("root", GlobalRole::Superuser)
}

fn anna() -> Subject {
    Subject::new("anna", GlobalRole::Admin)
}

fn carlo() -> Subject {
    Subject::new("carlo", GlobalRole::Controller)
}

fn ugo() -> Subject {
    Subject::new("ugo", GlobalRole::User)
}

async fn setup() -> Zones {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    opp_db::run_migrations(&db).await.unwrap();

    let users = SurrealUserRepository::new(db.clone());
    for subject in [root(), anna(), carlo(), ugo()] {
        users
            .create(CreateUser {
                email: format!("{}@example.com", subject.username),
                username: subject.username.clone(),
                name: subject.username.clone(),
                surname: "Test".into(),
                password: "pw".into(),
                role: subject.role,
            })
            .await
            .unwrap();
    }

    ZoneService::new(
        SurrealZoneRepository::new(db.clone()),
        SurrealZoneRoleRepository::new(db.clone()),
        users,
    )
}

fn square(x0: f64, y0: f64, side: f64) -> ZoneGeometry {
    ZoneGeometry::from_rings(
        &[
            (x0, y0),
            (x0 + side, y0),
            (x0 + side, y0 + side),
            (x0, y0 + side),
            (x0, y0),
        ],
        &[],
    )
    .unwrap()
}

fn zone_input(name: &str, geometry: ZoneGeometry) -> CreateZone {
    CreateZone {
        name: name.into(),
        available: true,
        geometry,
        metadata: Some(json!({ "color": "#0044aa" })),
        pricing: ZonePricing {
            price_offset: 0.0,
            price_lin: 1.0,
            price_exp: 1.0,
        },
    }
}

async fn centro(service: &Zones) -> Zone {
    service
        .create_zone(&anna(), zone_input("centro", square(0.0, 0.0, 1.0)))
        .await
        .unwrap()
}

fn assign(username: &str, role: &str) -> AssignZoneRole {
    AssignZoneRole {
        username: username.into(),
        role: role.into(),
    }
}

#[tokio::test]
async fn plain_user_cannot_create_zones() {
    let service = setup().await;
    let err = service
        .create_zone(&ugo(), zone_input("centro", square(0.0, 0.0, 1.0)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OppError::Forbidden { .. }),
        "expected Forbidden, got: {err:?}"
    );
}

#[tokio::test]
async fn creator_is_zone_admin() {
    let service = setup().await;
    let zone = centro(&service).await;

    let role = service.zone_user_role(zone.id, "anna").await.unwrap();
    assert_eq!(role.role, ZoneRole::Admin);

    let mine = service.user_zones(&anna()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].id, zone.id);
}

#[tokio::test]
async fn admin_looks_up_another_users_zones() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    let found = service.zones_of_user(&anna(), "carlo").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, zone.id);
    assert_eq!(service.zones_of_user(&carlo(), "carlo").await.unwrap().len(), 1);

    let err = service.zones_of_user(&ugo(), "carlo").await.unwrap_err();
    assert!(
        matches!(err, OppError::Forbidden { .. }),
        "expected Forbidden, got: {err:?}"
    );
    let err = service.zones_of_user(&carlo(), "anna").await.unwrap_err();
    assert!(matches!(err, OppError::Forbidden { .. }), "got: {err:?}");

    let err = service.zones_of_user(&root(), "ugo").await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn metadata_must_be_an_object() {
    let service = setup().await;
    let mut input = zone_input("centro", square(0.0, 0.0, 1.0));
    input.metadata = Some(json!("blue"));
    let err = service.create_zone(&anna(), input).await.unwrap_err();
    assert!(matches!(err, OppError::InvalidInput { .. }), "got: {err:?}");
}

#[tokio::test]
async fn overlapping_zone_is_rejected() {
    let service = setup().await;
    centro(&service).await;

    let err = service
        .create_zone(&anna(), zone_input("nord", square(0.5, 0.5, 1.0)))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OppError::Overlap { .. }),
        "expected Overlap, got: {err:?}"
    );

    service
        .create_zone(&anna(), zone_input("est", square(1.0, 0.0, 1.0)))
        .await
        .unwrap();
}

#[tokio::test]
async fn point_lookup_and_out_of_range_coordinates() {
    let service = setup().await;
    let zone = centro(&service).await;

    let found = service.zone_at(0.5, 0.5).await.unwrap();
    assert_eq!(found.id, zone.id);
    assert_eq!(service.zones_containing(0.5, 0.5).await.unwrap().len(), 1);
    assert!(service.zones_containing(5.0, 5.0).await.unwrap().is_empty());

    let err = service.zone_at(95.0, 0.0).await.unwrap_err();
    assert!(matches!(err, OppError::InvalidInput { .. }), "got: {err:?}");
}

#[tokio::test]
async fn controller_cannot_grant_admin() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    let err = service
        .add_user(&carlo(), zone.id, assign("ugo", "admin"))
        .await
        .unwrap_err();
    assert!(
        matches!(err, OppError::Forbidden { .. }),
        "expected Forbidden, got: {err:?}"
    );
    assert!(matches!(
        service.zone_user_role(zone.id, "ugo").await,
        Err(OppError::NotFound { .. })
    ));
}

#[tokio::test]
async fn zone_admin_cannot_grant_admin_but_superuser_can() {
    let service = setup().await;
    let zone = centro(&service).await;

    let err = service
        .add_user(&anna(), zone.id, assign("ugo", "admin"))
        .await
        .unwrap_err();
    assert!(matches!(err, OppError::Forbidden { .. }), "got: {err:?}");

    let granted = service
        .add_user(&root(), zone.id, assign("ugo", "admin"))
        .await
        .unwrap();
    assert_eq!(granted.role, ZoneRole::Admin);
    assert_eq!(granted.assigned_by, "root");
}

#[tokio::test]
async fn controller_cannot_grant_controller() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    let err = service
        .add_user(&carlo(), zone.id, assign("ugo", "controller"))
        .await
        .unwrap_err();
    assert!(matches!(err, OppError::Forbidden { .. }), "got: {err:?}");
}

#[tokio::test]
async fn unknown_role_user_and_zone() {
    let service = setup().await;
    let zone = centro(&service).await;

    let err = service
        .add_user(&anna(), zone.id, assign("ugo", "owner"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, OppError::InvalidRole(role) if role == "owner"),
        "expected InvalidRole, got: {err:?}"
    );

    let err = service
        .add_user(&anna(), zone.id, assign("nobody", "controller"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, OppError::NotFound { entity, .. } if entity == "user"),
        "got: {err:?}"
    );

    let err = service
        .add_user(&root(), Uuid::new_v4(), assign("ugo", "controller"))
        .await
        .unwrap_err();
    assert!(
        matches!(&err, OppError::NotFound { entity, .. } if entity == "zone"),
        "got: {err:?}"
    );
}

#[tokio::test]
async fn duplicate_assignment_conflicts() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    let err = service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap_err();
    assert!(matches!(err, OppError::AlreadyExists { .. }), "got: {err:?}");
}

#[tokio::test]
async fn only_zone_admin_updates_and_lists_roles() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    let update = UpdateZone {
        available: Some(false),
        ..Default::default()
    };
    let err = service
        .update_zone(&carlo(), zone.id, update.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, OppError::Forbidden { .. }), "got: {err:?}");

    let updated = service.update_zone(&anna(), zone.id, update).await.unwrap();
    assert!(!updated.available);
    assert_eq!(updated.geometry, zone.geometry);

    let roles = service.zone_users(&anna(), zone.id).await.unwrap();
    assert_eq!(roles.len(), 2);
    assert!(service.zone_users(&ugo(), zone.id).await.is_err());
}

#[tokio::test]
async fn global_admin_without_zone_role_is_denied() {
    let service = setup().await;
    let zone = centro(&service).await;
    let other_admin = Subject::new("root2", GlobalRole::Admin);

    let err = service.delete_zone(&other_admin, zone.id).await.unwrap_err();
    assert!(matches!(err, OppError::Forbidden { .. }), "got: {err:?}");
}

#[tokio::test]
async fn removing_role_and_deleting_zone() {
    let service = setup().await;
    let zone = centro(&service).await;
    service
        .add_user(&anna(), zone.id, assign("carlo", "controller"))
        .await
        .unwrap();

    service.remove_user(&anna(), zone.id, "carlo").await.unwrap();
    assert!(service.user_zones(&carlo()).await.unwrap().is_empty());

    service.delete_zone(&anna(), zone.id).await.unwrap();
    assert!(!service.zone_exists(zone.id).await.unwrap());

    let err = service.delete_zone(&anna(), zone.id).await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn debug_superuser_creates_zone_without_user_record() {
    let service = setup().await;
    let debug = Subject::new("superuser_debug", GlobalRole::Superuser);
    let zone = service
        .create_zone(&debug, zone_input("debug", square(10.0, 10.0, 1.0)))
        .await
        .unwrap();
    let role = service.zone_user_role(zone.id, "superuser_debug").await.unwrap();
    assert_eq!(role.role, ZoneRole::Admin);
}
