//! Car domain model.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Car {
    pub plate: String,
    pub brand: String,
    pub model: String,
    /// Username of the owning user.
    pub owner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCar {
    pub plate: String,
    pub brand: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateCar {
    pub brand: Option<String>,
    pub model: Option<String>,
}

/// Canonical plate form: trimmed, upper case.
pub fn normalize_plate(plate: &str) -> String {
    plate.trim().to_uppercase()
}
