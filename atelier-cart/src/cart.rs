use atelier_core::payment::CartSnapshot;
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::cache::CartCache;
use crate::client::ReservationApi;
use crate::models::CartItem;

/// The shopper-facing cart: reserve-on-add, release-on-remove, with the
/// local mirror kept behind a shared handle so the countdown and
/// reconciliation actors see the same state.
pub struct Cart {
    session_id: SessionId,
    cache: Arc<Mutex<CartCache>>,
    api: Arc<dyn ReservationApi>,
}

impl Cart {
    pub fn new(session_id: SessionId, api: Arc<dyn ReservationApi>, debounce: Duration) -> Self {
        let cache = Arc::new(Mutex::new(CartCache::new(session_id.clone(), debounce)));
        Self {
            session_id,
            cache,
            api,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Shared handle for the countdown ticker and reconciler.
    pub fn cache(&self) -> Arc<Mutex<CartCache>> {
        Arc::clone(&self.cache)
    }

    /// Add a product: the hold is created first, the mirror only reflects a
    /// reservation the store acknowledged. `AlreadyHeld` means another
    /// shopper got there first.
    pub async fn add(
        &self,
        product_id: Uuid,
        name: &str,
        price_cents: i64,
    ) -> Result<CartItem, StoreError> {
        let reservation = self.api.reserve(&self.session_id, product_id).await?;
        let item = CartItem::from_reservation(&reservation, name, price_cents);
        self.cache.lock().await.insert(item.clone());
        Ok(item)
    }

    /// Remove a product and release its hold. Idempotent like the store's
    /// release.
    pub async fn remove(&self, product_id: Uuid) -> Result<bool, StoreError> {
        let released = self.api.release(&self.session_id, product_id).await?;
        self.cache.lock().await.remove(&product_id);
        Ok(released)
    }

    pub async fn items(&self) -> Vec<CartItem> {
        self.cache.lock().await.items()
    }

    /// Snapshot for payment-intent metadata.
    pub async fn snapshot(&self) -> CartSnapshot {
        self.cache.lock().await.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DirectReservationApi;
    use atelier_catalog::{MemoryStore, Product, ProductRepository};
    use atelier_core::repository::ReservationRepository;

    #[tokio::test]
    async fn add_reserves_and_conflicting_add_reports_taken() {
        let store = Arc::new(MemoryStore::new());
        let product = Product::new("cedar-box", "Cedar Box", "Wren", 5_400);
        store.create(&product).await.unwrap();

        let api: Arc<dyn ReservationApi> = Arc::new(DirectReservationApi::new(
            store.clone() as Arc<dyn ReservationRepository>,
            Duration::minutes(15),
        ));

        let cart_a = Cart::new(SessionId::generate(), api.clone(), Duration::seconds(5));
        let cart_b = Cart::new(SessionId::generate(), api, Duration::seconds(5));

        let item = cart_a
            .add(product.id, &product.name, product.price_cents)
            .await
            .unwrap();
        assert_eq!(item.product_id, product.id);

        let err = cart_b
            .add(product.id, &product.name, product.price_cents)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyHeld { .. }));

        // A releases; B can now claim the piece.
        assert!(cart_a.remove(product.id).await.unwrap());
        cart_b
            .add(product.id, &product.name, product.price_cents)
            .await
            .unwrap();
        assert_eq!(cart_b.items().await.len(), 1);
    }
}
