use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

/// Reservation lifecycle status. Terminal once non-active; a new
/// add-to-cart always creates a new reservation rather than reviving one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Expired,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Expired => "expired",
            ReservationStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(ReservationStatus::Active),
            "expired" => Some(ReservationStatus::Expired),
            "completed" => Some(ReservationStatus::Completed),
            _ => None,
        }
    }
}

/// A time-bounded exclusive claim on one unit of inventory by one shopper
/// session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Uuid,
    pub product_id: Uuid,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn new(product_id: Uuid, session_id: SessionId, hold: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product_id,
            session_id,
            created_at: now,
            expires_at: now + hold,
            status: ReservationStatus::Active,
        }
    }

    /// Whether the wall clock has passed `expires_at`, regardless of status.
    pub fn is_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// A reservation counts as holding its product only while it is both
    /// `active` and not lapsed. A lapsed-but-unswept row must read as not
    /// holding anything.
    pub fn is_holding(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Active && !self.is_lapsed(now)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }
}

/// Outcome of one expiry-sweep run. `released_products` carries the product
/// ids whose availability fields were cleared, so callers can invalidate
/// caches and push availability updates.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepSummary {
    pub reservations_expired: usize,
    pub products_released: usize,
    pub errors: usize,
    pub released_products: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lapse_is_wall_clock_comparison() {
        let r = Reservation::new(Uuid::new_v4(), SessionId::generate(), Duration::minutes(15));
        let now = Utc::now();
        assert!(!r.is_lapsed(now));
        assert!(r.is_holding(now));
        assert!(r.is_lapsed(r.expires_at));
        assert!(!r.is_holding(r.expires_at));
    }

    #[test]
    fn completed_reservation_is_not_holding() {
        let mut r = Reservation::new(Uuid::new_v4(), SessionId::generate(), Duration::minutes(15));
        r.status = ReservationStatus::Completed;
        assert!(!r.is_holding(Utc::now()));
    }

    #[test]
    fn status_round_trips_through_storage_strings() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Expired,
            ReservationStatus::Completed,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ReservationStatus::parse("held"), None);
    }
}
