use async_trait::async_trait;
use atelier_shared::pii::Masked;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// Snapshot of the cart at the moment the payment intent is created. Carried
/// in the payment metadata so the finalizer can build order lines without
/// trusting the client at callback time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CartSnapshot {
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotItem {
    pub product_id: Uuid,
    pub name: String,
    pub price_cents: i64,
}

impl CartSnapshot {
    pub fn total_cents(&self) -> i64 {
        self.items.iter().map(|i| i.price_cents).sum()
    }

    pub fn product_ids(&self) -> Vec<Uuid> {
        self.items.iter().map(|i| i.product_id).collect()
    }
}

/// A payment intent as mirrored from the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Provider's id (e.g. pi_123)
    pub id: String,
    pub session_id: SessionId,
    pub amount_cents: i64,
    pub currency: String,
    pub status: PaymentStatus,
    pub client_secret: Option<String>,
    /// session_id + cart snapshot, round-tripped through the provider
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// The settled outcome of a payment, as decoded from the processor's
/// callback. Sole input to the checkout finalizer.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub intent_id: String,
    pub session_id: SessionId,
    pub status: PaymentStatus,
    pub snapshot: CartSnapshot,
    pub customer_email: Option<Masked<String>>,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Create a payment intent with the provider. `metadata` must carry the
    /// session id and cart snapshot so the asynchronous callback can be
    /// attributed.
    async fn create_intent(
        &self,
        session_id: &SessionId,
        amount_cents: i64,
        currency: &str,
        metadata: serde_json::Value,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>>;

    /// Retrieve intent status
    async fn get_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>>;
}
