use atelier_core::payment::CartSnapshot;
use atelier_core::session::SessionId;
use atelier_shared::pii::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

/// The durable record of a completed checkout. Once the payment processor
/// reports success, this is the source of truth; downstream bookkeeping is
/// best-effort against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub session_id: SessionId,
    /// Provider intent id; one order per intent, which is what makes
    /// redelivered callbacks detectable.
    pub payment_intent_id: String,
    pub customer_email: Option<Masked<String>>,
    pub status: OrderStatus,
    pub total_cents: i64,
    pub currency: String,
    pub lines: Vec<OrderLine>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Build a confirmed order from the cart snapshot carried in the
    /// payment metadata.
    pub fn from_snapshot(
        session_id: SessionId,
        payment_intent_id: &str,
        snapshot: &CartSnapshot,
        customer_email: Option<Masked<String>>,
    ) -> Self {
        let id = Uuid::new_v4();
        let lines = snapshot
            .items
            .iter()
            .map(|item| OrderLine {
                id: Uuid::new_v4(),
                order_id: id,
                product_id: item.product_id,
                name: item.name.clone(),
                price_cents: item.price_cents,
            })
            .collect();
        Self {
            id,
            session_id,
            payment_intent_id: payment_intent_id.to_string(),
            customer_email,
            status: OrderStatus::Confirmed,
            total_cents: snapshot.total_cents(),
            currency: "USD".to_string(),
            lines,
            created_at: Utc::now(),
        }
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.lines.iter().map(|line| line.product_id).collect()
    }
}

/// One purchased piece within an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}
