use atelier_core::reservation::Reservation;
use atelier_core::session::SessionId;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A cart line in the local mirror. Copied from the store's reservation
/// response at creation time; advisory only, never trusted for final
/// availability decisions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: Uuid,
    pub session_id: SessionId,
    pub name: String,
    pub price_cents: i64,
    pub reserved_until: DateTime<Utc>,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    pub fn from_reservation(reservation: &Reservation, name: &str, price_cents: i64) -> Self {
        Self {
            product_id: reservation.product_id,
            session_id: reservation.session_id.clone(),
            name: name.to_string(),
            price_cents,
            reserved_until: reservation.expires_at,
            added_at: Utc::now(),
        }
    }

}

/// Interpret a store timestamp as an absolute instant.
///
/// A value without an explicit zone indicator represents the same instant
/// the authoritative store uses (UTC), never the browser's local time;
/// reading it as local-naive would make ordinary clock offsets look like
/// expiry.
pub fn parse_store_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    raw.parse::<chrono::NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Countdown urgency bands for the cart header styling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Calm,
    Warning,
    Critical,
}

impl Urgency {
    pub fn classify(remaining: Duration, warn_below: Duration, critical_below: Duration) -> Self {
        if remaining < critical_below {
            Urgency::Critical
        } else if remaining < warn_below {
            Urgency::Warning
        } else {
            Urgency::Calm
        }
    }
}

/// One countdown frame pushed to the UI every tick.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CountdownState {
    pub remaining_seconds: i64,
    pub urgency: Urgency,
}

impl CountdownState {
    pub fn new(remaining: Duration, warn_below: Duration, critical_below: Duration) -> Self {
        Self {
            remaining_seconds: remaining.num_seconds().max(0),
            urgency: Urgency::classify(remaining, warn_below, critical_below),
        }
    }
}

/// User-visible cart notices. An expired hold is reported distinctly from
/// other removal causes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartNotice {
    /// "Your hold expired", raised by the countdown after the debounce
    /// recheck confirmed the lapse.
    HoldExpired { product_ids: Vec<Uuid> },
    /// One aggregated notice per reconciliation pass that dropped items.
    ItemsRemoved { count: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoneless_timestamp_reads_as_the_same_absolute_instant() {
        let explicit = parse_store_timestamp("2026-03-01T12:30:00Z").unwrap();
        let naive = parse_store_timestamp("2026-03-01T12:30:00").unwrap();
        assert_eq!(explicit, naive);

        let offset = parse_store_timestamp("2026-03-01T14:30:00+02:00").unwrap();
        assert_eq!(explicit, offset);

        assert!(parse_store_timestamp("half past twelve").is_none());
    }

    #[test]
    fn urgency_bands_follow_the_fixed_thresholds() {
        let warn = Duration::minutes(5);
        let critical = Duration::minutes(2);

        assert_eq!(
            Urgency::classify(Duration::minutes(10), warn, critical),
            Urgency::Calm
        );
        assert_eq!(
            Urgency::classify(Duration::minutes(5), warn, critical),
            Urgency::Calm
        );
        assert_eq!(
            Urgency::classify(Duration::minutes(4), warn, critical),
            Urgency::Warning
        );
        assert_eq!(
            Urgency::classify(Duration::seconds(119), warn, critical),
            Urgency::Critical
        );
    }

    #[test]
    fn countdown_state_clamps_at_zero() {
        let warn = Duration::minutes(5);
        let critical = Duration::minutes(2);

        // One second before a 15-minute hold lapses the display shows 1;
        // at the boundary it shows 0, never a negative count.
        let state = CountdownState::new(Duration::seconds(1), warn, critical);
        assert_eq!(state.remaining_seconds, 1);

        let state = CountdownState::new(Duration::seconds(-3), warn, critical);
        assert_eq!(state.remaining_seconds, 0);
        assert_eq!(state.urgency, Urgency::Critical);
    }
}
