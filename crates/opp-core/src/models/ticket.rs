//! Ticket domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::repository::Pagination;

/// A parking permit for one car in one zone over a time window.
///
/// `price` is computed once at creation and never recomputed, so later
/// tariff changes on the zone do not affect issued tickets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub plate: String,
    pub zone_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price: f64,
    pub paid: bool,
    pub creation_time: DateTime<Utc>,
}

impl Ticket {
    /// Paid and not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.paid && self.end_date >= now
    }
}

/// Client request for a new ticket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRequest {
    pub plate: String,
    pub zone_id: Uuid,
    pub start_date: DateTime<Utc>,
    /// Requested duration in minutes.
    pub duration: i64,
}

/// Fully resolved ticket ready for insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicket {
    pub plate: String,
    pub zone_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub price: f64,
}

/// Filter for administrative ticket listings.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub valid_only: bool,
    pub start_date_after: Option<DateTime<Utc>>,
    pub end_date_before: Option<DateTime<Utc>>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ticket(paid: bool, end_offset_mins: i64) -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            plate: "AB123CD".into(),
            zone_id: Uuid::new_v4(),
            start_date: now - Duration::hours(2),
            end_date: now + Duration::minutes(end_offset_mins),
            price: 1.0,
            paid,
            creation_time: now - Duration::hours(3),
        }
    }

    #[test]
    fn validity_requires_paid_and_unexpired() {
        let now = Utc::now();
        assert!(ticket(true, 30).is_valid_at(now));
        assert!(!ticket(false, 30).is_valid_at(now));
        assert!(!ticket(true, -30).is_valid_at(now));
    }
}
