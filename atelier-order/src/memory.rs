use async_trait::async_trait;
use atelier_core::StoreError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::Order;
use crate::repository::OrderRepository;

/// In-memory order store for tests and local development.
#[derive(Default)]
pub struct MemoryOrders {
    inner: Mutex<HashMap<Uuid, Order>>,
}

impl MemoryOrders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrders {
    async fn create(&self, order: &Order) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.get(&id).cloned())
    }

    async fn find_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .values()
            .find(|order| order.payment_intent_id == intent_id)
            .cloned())
    }
}
