use atelier_core::payment::{CartSnapshot, PaymentAdapter, PaymentIntent, PaymentStatus};
use atelier_core::session::SessionId;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Thin seam between checkout and the payment provider. Adapter selection
/// (by currency, by region) would live here.
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    /// Open a payment intent for the session's cart. The metadata carries
    /// the session id and the cart snapshot so the asynchronous callback can
    /// rebuild the order without trusting the client.
    pub async fn begin_checkout(
        &self,
        session_id: &SessionId,
        snapshot: &CartSnapshot,
        currency: &str,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        let metadata = serde_json::json!({
            "session_id": session_id.as_str(),
            "cart": snapshot,
        });
        self.adapter
            .create_intent(session_id, snapshot.total_cents(), currency, metadata)
            .await
    }

    /// Re-read an intent from the provider (e.g. while handling a webhook).
    pub async fn lookup_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        self.adapter.get_intent(intent_id).await
    }
}

/// Provider stand-in used by tests and local development. Remembers every
/// intent it created so `get_intent` round-trips the metadata.
#[derive(Default)]
pub struct MockPaymentAdapter {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip a stored intent's status, simulating the provider settling it.
    pub fn settle(&self, intent_id: &str, status: PaymentStatus) {
        let mut intents = self.intents.lock().unwrap();
        if let Some(intent) = intents.get_mut(intent_id) {
            intent.status = status;
        }
    }
}

#[async_trait::async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn create_intent(
        &self,
        session_id: &SessionId,
        amount_cents: i64,
        currency: &str,
        metadata: serde_json::Value,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        let intent = PaymentIntent {
            id: format!("mock_pi_{}", uuid::Uuid::new_v4().simple()),
            session_id: session_id.clone(),
            amount_cents,
            currency: currency.to_string(),
            status: PaymentStatus::RequiresPaymentMethod,
            client_secret: Some("mock_secret_123".to_string()),
            metadata,
            created_at: Utc::now(),
        };
        self.intents
            .lock()
            .unwrap()
            .insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(
        &self,
        intent_id: &str,
    ) -> Result<PaymentIntent, Box<dyn std::error::Error + Send + Sync>> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| format!("unknown intent: {intent_id}").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::payment::SnapshotItem;

    #[tokio::test]
    async fn begin_checkout_embeds_session_and_cart_in_metadata() {
        let adapter = Arc::new(MockPaymentAdapter::new());
        let orchestrator = PaymentOrchestrator::new(adapter.clone());
        let session = SessionId::generate();
        let snapshot = CartSnapshot {
            items: vec![SnapshotItem {
                product_id: uuid::Uuid::new_v4(),
                name: "Hand-bound Journal".to_string(),
                price_cents: 6_800,
            }],
        };

        let intent = orchestrator
            .begin_checkout(&session, &snapshot, "USD")
            .await
            .unwrap();
        assert_eq!(intent.amount_cents, 6_800);
        assert_eq!(intent.metadata["session_id"], session.as_str());

        let fetched = orchestrator.lookup_intent(&intent.id).await.unwrap();
        let round_tripped: CartSnapshot =
            serde_json::from_value(fetched.metadata["cart"].clone()).unwrap();
        assert_eq!(round_tripped, snapshot);
    }
}
