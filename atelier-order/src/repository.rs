use async_trait::async_trait;
use atelier_core::StoreError;
use uuid::Uuid;

use crate::models::Order;

/// Repository for completed checkouts.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn create(&self, order: &Order) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError>;

    /// Idempotency probe: the order previously created for this payment
    /// intent, if any.
    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError>;
}
