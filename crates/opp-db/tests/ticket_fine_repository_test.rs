//! Integration tests for the Ticket, Fine and Totem repositories using
//! in-memory SurrealDB.

use chrono::{Duration, Utc};
use opp_core::error::OppError;
use opp_core::geometry::ZoneGeometry;
use opp_core::models::car::CreateCar;
use opp_core::models::fine::CreateFine;
use opp_core::models::ticket::{CreateTicket, TicketFilter};
use opp_core::models::totem::UpsertTotem;
use opp_core::models::user::{CreateUser, GlobalRole};
use opp_core::models::zone::{CreateZone, Zone, ZonePricing};
use opp_core::repository::{
    CarRepository, FineRepository, Pagination, TicketRepository, TotemRepository, UserRepository,
    ZoneRepository,
};
use opp_db::repository::{
    SurrealCarRepository, SurrealFineRepository, SurrealTicketRepository, SurrealTotemRepository,
    SurrealUserRepository, SurrealZoneRepository,
};
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;

/// Helper: in-memory DB with user "mario" owning car "AB123CD" and one zone.
async fn setup() -> (Surreal<Db>, Zone) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    opp_db::run_migrations(&db).await.unwrap();

    SurrealUserRepository::new(db.clone())
        .create(CreateUser {
            username: "mario".into(),
            name: "Mario".into(),
            surname: "Rossi".into(),
            email: "mario@example.com".into(),
            password: "pw".into(),
            role: GlobalRole::User,
        })
        .await
        .unwrap();
    SurrealCarRepository::new(db.clone())
        .create(
            "mario",
            CreateCar {
                plate: "AB123CD".into(),
                brand: "Fiat".into(),
                model: "Panda".into(),
            },
        )
        .await
        .unwrap();

    let geometry = ZoneGeometry::from_rings(
        &[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0), (0.0, 0.0)],
        &[],
    )
    .unwrap();
    let zone = SurrealZoneRepository::new(db.clone())
        .create(
            CreateZone {
                name: "centro".into(),
                available: true,
                geometry,
                metadata: None,
                pricing: ZonePricing {
                    price_offset: 0.0,
                    price_lin: 1.0,
                    price_exp: 1.0,
                },
            },
            "mario",
        )
        .await
        .unwrap();
    (db, zone)
}

fn ticket_input(zone: &Zone, start_in_hours: i64, hours: i64) -> CreateTicket {
    let start_date = Utc::now() + Duration::hours(start_in_hours);
    CreateTicket {
        plate: "AB123CD".into(),
        zone_id: zone.id,
        start_date,
        end_date: start_date + Duration::hours(hours),
        price: hours as f64,
    }
}

#[tokio::test]
async fn ticket_is_created_unpaid() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);

    let ticket = tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();
    assert!(!ticket.paid);
    assert_eq!(ticket.price, 1.0);
    assert_eq!(ticket.zone_id, zone.id);

    let fetched = tickets.get_by_id(ticket.id).await.unwrap();
    assert_eq!(fetched.end_date, ticket.end_date);
}

#[tokio::test]
async fn ticket_for_unknown_car_is_not_found() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);

    let mut input = ticket_input(&zone, 1, 1);
    input.plate = "ZZ000ZZ".into();
    let err = tickets.create(input).await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn paying_twice_is_already_paid() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);
    let ticket = tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();

    let paid = tickets.pay(ticket.id).await.unwrap();
    assert!(paid.paid);

    let err = tickets.pay(ticket.id).await.unwrap_err();
    assert!(
        matches!(err, OppError::AlreadyPaid { .. }),
        "expected AlreadyPaid, got: {err:?}"
    );

    let err = tickets.pay(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn paid_ticket_survives_delete() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);
    let unpaid = tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();
    let paid = tickets.create(ticket_input(&zone, 2, 1)).await.unwrap();
    tickets.pay(paid.id).await.unwrap();

    let err = tickets.delete_unpaid(paid.id).await.unwrap_err();
    assert!(
        matches!(err, OppError::AlreadyPaid { .. }),
        "expected AlreadyPaid, got: {err:?}"
    );
    assert!(tickets.get_by_id(paid.id).await.is_ok());

    tickets.delete_unpaid(unpaid.id).await.unwrap();
    let err = tickets.get_by_id(unpaid.id).await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn valid_only_filters_unpaid_and_expired() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);

    let current = tickets.create(ticket_input(&zone, -1, 3)).await.unwrap();
    tickets.pay(current.id).await.unwrap();
    let expired = tickets.create(ticket_input(&zone, -5, 1)).await.unwrap();
    tickets.pay(expired.id).await.unwrap();
    tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();

    let now = Utc::now();
    let all = tickets.list_by_owner("mario", false, now).await.unwrap();
    assert_eq!(all.len(), 3);

    let valid = tickets.list_by_owner("mario", true, now).await.unwrap();
    assert_eq!(valid.len(), 1);
    assert_eq!(valid[0].id, current.id);

    let filtered = tickets
        .list(
            TicketFilter {
                valid_only: true,
                ..Default::default()
            },
            now,
        )
        .await
        .unwrap();
    assert_eq!(filtered.total, 1);

    assert!(tickets.list_by_owner("luigi", false, now).await.unwrap().is_empty());
    assert_eq!(tickets.list_by_plate("AB123CD").await.unwrap().len(), 3);
}

#[tokio::test]
async fn zone_tickets_are_most_recent_first() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);
    let first = tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();
    let second = tickets.create(ticket_input(&zone, 2, 1)).await.unwrap();
    let third = tickets.create(ticket_input(&zone, 3, 1)).await.unwrap();

    let page = tickets
        .list_by_zone(zone.id, Pagination::new(0, 2))
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let ids: Vec<_> = page.items.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![third.id, second.id]);

    let rest = tickets
        .list_by_zone(zone.id, Pagination::new(2, 2))
        .await
        .unwrap();
    assert_eq!(rest.items.len(), 1);
    assert_eq!(rest.items[0].id, first.id);
}

#[tokio::test]
async fn zone_with_tickets_cannot_be_deleted() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db.clone());
    let zones = SurrealZoneRepository::new(db);
    tickets.create(ticket_input(&zone, 1, 1)).await.unwrap();

    let err = zones.delete(zone.id).await.unwrap_err();
    assert!(matches!(err, OppError::InUse { .. }), "got: {err:?}");
    assert!(zones.exists(zone.id).await.unwrap());
}

#[tokio::test]
async fn zone_with_fines_cannot_be_deleted() {
    let (db, zone) = setup().await;
    let fines = SurrealFineRepository::new(db.clone());
    let zones = SurrealZoneRepository::new(db);
    fines
        .create(CreateFine {
            plate: "AB123CD".into(),
            zone_id: zone.id,
            amount: 42.0,
        })
        .await
        .unwrap();

    let err = zones.delete(zone.id).await.unwrap_err();
    assert!(
        matches!(&err, OppError::InUse { referenced_by, .. } if referenced_by == "fine"),
        "expected InUse by fine, got: {err:?}"
    );
    assert!(zones.exists(zone.id).await.unwrap());
}

#[tokio::test]
async fn zone_delete_racing_ticket_insert_never_orphans_a_ticket() {
    let (db, _) = setup().await;
    let tickets = SurrealTicketRepository::new(db.clone());
    let zones = SurrealZoneRepository::new(db);

    for i in 0..5 {
        let x0 = 10.0 + 2.0 * f64::from(i);
        let zone = zones
            .create(
                CreateZone {
                    name: format!("race-{i}"),
                    available: true,
                    geometry: ZoneGeometry::from_rings(
                        &[(x0, 0.0), (x0 + 1.0, 0.0), (x0 + 1.0, 1.0), (x0, 1.0), (x0, 0.0)],
                        &[],
                    )
                    .unwrap(),
                    metadata: None,
                    pricing: ZonePricing {
                        price_offset: 0.0,
                        price_lin: 1.0,
                        price_exp: 1.0,
                    },
                },
                "mario",
            )
            .await
            .unwrap();

        let (deleted, created) = tokio::join!(
            zones.delete(zone.id),
            tickets.create(ticket_input(&zone, 1, 1))
        );
        assert!(
            deleted.is_ok() != created.is_ok(),
            "exactly one of delete and insert must win: {deleted:?} / {created:?}"
        );

        let referencing = tickets
            .list_by_zone(zone.id, Pagination::default())
            .await
            .unwrap()
            .total;
        if deleted.is_ok() {
            assert_eq!(referencing, 0, "ticket left pointing at deleted zone");
            assert!(matches!(created, Err(OppError::NotFound { .. })), "got: {created:?}");
        } else {
            assert!(zones.exists(zone.id).await.unwrap());
            assert!(matches!(deleted, Err(OppError::InUse { .. })), "got: {deleted:?}");
        }
    }
}

#[tokio::test]
async fn date_filters_include_their_bounds() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db);
    let ticket = tickets.create(ticket_input(&zone, 1, 2)).await.unwrap();
    tickets.create(ticket_input(&zone, 5, 1)).await.unwrap();

    let page = tickets
        .list(
            TicketFilter {
                start_date_after: Some(ticket.start_date),
                end_date_before: Some(ticket.end_date),
                ..Default::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, ticket.id);
}

#[tokio::test]
async fn currently_parked_keeps_cars_with_a_running_paid_ticket() {
    let (db, zone) = setup().await;
    let tickets = SurrealTicketRepository::new(db.clone());
    let cars = SurrealCarRepository::new(db);
    cars.create(
        "mario",
        CreateCar {
            plate: "XY987ZW".into(),
            brand: "Lancia".into(),
            model: "Ypsilon".into(),
        },
    )
    .await
    .unwrap();

    let running = tickets.create(ticket_input(&zone, -1, 3)).await.unwrap();
    let now = Utc::now();
    assert!(cars.list_by_owner("mario", true, now).await.unwrap().is_empty());

    tickets.pay(running.id).await.unwrap();
    let parked = cars.list_by_owner("mario", true, now).await.unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].plate, "AB123CD");
    assert_eq!(cars.list_by_owner("mario", false, now).await.unwrap().len(), 2);

    let page = cars.list(Pagination::default(), true, now).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].plate, "AB123CD");

    let later = now + Duration::hours(3);
    assert_eq!(cars.list(Pagination::default(), true, later).await.unwrap().total, 0);
}

#[tokio::test]
async fn fine_lifecycle() {
    let (db, zone) = setup().await;
    let fines = SurrealFineRepository::new(db);

    let fine = fines
        .create(CreateFine {
            plate: "AB123CD".into(),
            zone_id: zone.id,
            amount: 42.0,
        })
        .await
        .unwrap();
    assert!(!fine.paid);

    assert_eq!(fines.list_by_owner("mario").await.unwrap().len(), 1);
    assert_eq!(fines.list_by_plate("AB123CD").await.unwrap().len(), 1);
    assert_eq!(
        fines
            .list_by_zone(zone.id, Pagination::default())
            .await
            .unwrap()
            .total,
        1
    );

    assert!(fines.pay(fine.id).await.unwrap().paid);
    let err = fines.pay(fine.id).await.unwrap_err();
    assert!(
        matches!(err, OppError::AlreadyPaid { .. }),
        "expected AlreadyPaid, got: {err:?}"
    );

    let err = fines.delete_unpaid(fine.id).await.unwrap_err();
    assert!(
        matches!(err, OppError::AlreadyPaid { .. }),
        "expected AlreadyPaid, got: {err:?}"
    );
    assert!(fines.get_by_id(fine.id).await.unwrap().paid);

    let unpaid = fines
        .create(CreateFine {
            plate: "AB123CD".into(),
            zone_id: zone.id,
            amount: 10.0,
        })
        .await
        .unwrap();
    fines.delete_unpaid(unpaid.id).await.unwrap();
    let err = fines.delete_unpaid(unpaid.id).await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn bulk_fine_delete() {
    let (db, zone) = setup().await;
    let fines = SurrealFineRepository::new(db);
    for amount in [10.0, 20.0] {
        fines
            .create(CreateFine {
                plate: "AB123CD".into(),
                zone_id: zone.id,
                amount,
            })
            .await
            .unwrap();
    }

    assert_eq!(fines.delete_all().await.unwrap(), 2);
    assert_eq!(fines.list(Pagination::default()).await.unwrap().total, 0);
}

#[tokio::test]
async fn totem_upsert_refreshes_registration() {
    let (db, zone) = setup().await;
    let totems = SurrealTotemRepository::new(db);

    let first = totems
        .upsert(UpsertTotem {
            id: "kiosk-1".into(),
            zone_id: zone.id,
            latitude: 0.5,
            longitude: 0.5,
        })
        .await
        .unwrap();
    let second = totems
        .upsert(UpsertTotem {
            id: "kiosk-1".into(),
            zone_id: zone.id,
            latitude: 0.6,
            longitude: 0.4,
        })
        .await
        .unwrap();
    assert_eq!(second.latitude, 0.6);
    assert!(second.registration_time >= first.registration_time);

    let page = totems.list(Pagination::default()).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, "kiosk-1");

    totems.delete("kiosk-1").await.unwrap();
    let err = totems.get_by_id("kiosk-1").await.unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}

#[tokio::test]
async fn totem_for_unknown_zone_is_not_found() {
    let (db, _) = setup().await;
    let totems = SurrealTotemRepository::new(db);

    let err = totems
        .upsert(UpsertTotem {
            id: "kiosk-9".into(),
            zone_id: Uuid::new_v4(),
            latitude: 0.0,
            longitude: 0.0,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, OppError::NotFound { .. }), "got: {err:?}");
}
