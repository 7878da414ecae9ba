//! Car registry service. Every mutation is scoped to the caller's own cars.

use chrono::Utc;
use opp_core::error::{OppError, OppResult};
use opp_core::models::car::{Car, CreateCar, UpdateCar, normalize_plate};
use opp_core::models::user::{GlobalRole, Subject};
use opp_core::permission::require_global;
use opp_core::repository::{CarRepository, PaginatedResult, Pagination};
use tracing::info;

pub struct CarService<C: CarRepository> {
    cars: C,
}

impl<C: CarRepository> CarService<C> {
    pub fn new(cars: C) -> Self {
        Self { cars }
    }

    pub async fn add_car(&self, subject: &Subject, input: CreateCar) -> OppResult<Car> {
        if normalize_plate(&input.plate).is_empty() {
            return Err(OppError::invalid_input("plate must not be empty"));
        }
        let car = self.cars.create(&subject.username, input).await?;
        info!(plate = %car.plate, owner = %car.owner, "Car registered");
        Ok(car)
    }

    /// A car owned by someone else is reported as `NotFound`.
    pub async fn update_car(
        &self,
        subject: &Subject,
        plate: &str,
        input: UpdateCar,
    ) -> OppResult<Car> {
        self.cars.update(&subject.username, plate, input).await
    }

    pub async fn delete_car(&self, subject: &Subject, plate: &str) -> OppResult<()> {
        self.cars.delete(&subject.username, plate).await?;
        info!(plate = %normalize_plate(plate), owner = %subject.username, "Car removed");
        Ok(())
    }

    /// Cars of the caller; with `currently_parked`, only those covered by
    /// a paid ticket right now.
    pub async fn user_cars(&self, subject: &Subject, currently_parked: bool) -> OppResult<Vec<Car>> {
        self.cars
            .list_by_owner(&subject.username, currently_parked, Utc::now())
            .await
    }

    pub async fn list_cars(
        &self,
        subject: &Subject,
        pagination: Pagination,
        currently_parked: bool,
    ) -> OppResult<PaginatedResult<Car>> {
        require_global(subject, GlobalRole::is_admin, "list cars")?;
        self.cars.list(pagination, currently_parked, Utc::now()).await
    }

    /// Delete every car without tickets or fines. Returns the count.
    pub async fn delete_all_cars(&self, subject: &Subject) -> OppResult<u64> {
        require_global(subject, GlobalRole::is_admin, "delete all cars")?;
        let deleted = self.cars.delete_all().await?;
        info!(deleted, by = %subject.username, "Cars deleted");
        Ok(deleted)
    }
}
