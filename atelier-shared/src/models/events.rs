use uuid::Uuid;

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct HoldPlacedEvent {
    pub product_id: Uuid,
    pub session_id: String,
    pub expires_at: i64,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct HoldReleasedEvent {
    pub product_id: Uuid,
    pub session_id: String,
    /// "expired", "released" or "payment_failed"
    pub cause: String,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderConfirmedEvent {
    pub order_id: Uuid,
    pub session_id: String,
    pub total_cents: i64,
    pub line_count: usize,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct SweepCompletedEvent {
    pub reservations_expired: usize,
    pub products_released: usize,
    pub errors: usize,
    pub timestamp: i64,
}

/// Availability transition pushed to product pages over SSE.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AvailabilityEvent {
    Held { product_id: Uuid, until: i64 },
    Released { product_id: Uuid },
    Sold { product_id: Uuid },
}

impl AvailabilityEvent {
    pub fn product_id(&self) -> Uuid {
        match self {
            AvailabilityEvent::Held { product_id, .. } => *product_id,
            AvailabilityEvent::Released { product_id } => *product_id,
            AvailabilityEvent::Sold { product_id } => *product_id,
        }
    }
}
