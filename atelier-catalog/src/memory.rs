use async_trait::async_trait;
use atelier_core::repository::ReservationRepository;
use atelier_core::reservation::{Reservation, ReservationStatus, SweepSummary};
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::product::{Product, ProductRepository};

#[derive(Default)]
struct Inner {
    products: HashMap<Uuid, Product>,
    reservations: HashMap<Uuid, Reservation>,
}

/// In-memory reservation + product store.
///
/// Backs the test suites and local development; the Postgres repositories
/// implement the same traits with the same conditional-mutation semantics.
/// All checks and writes for one call happen under a single lock, which
/// gives the same atomicity the SQL layer gets from conditional UPDATEs.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationRepository for MemoryStore {
    async fn reserve(
        &self,
        product_id: Uuid,
        session_id: &SessionId,
        hold: Duration,
    ) -> Result<Reservation, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let expires_at = now + hold;

        {
            let product = inner
                .products
                .get(&product_id)
                .ok_or(StoreError::ProductNotFound(product_id))?;
            if product.sold {
                return Err(StoreError::Sold(product_id));
            }
            // A past reserved_until reads as available even before any sweep
            // has cleared the fields.
            if let (Some(holder), Some(until)) =
                (&product.reserved_by_session, product.reserved_until)
            {
                if until > now && holder != session_id {
                    return Err(StoreError::AlreadyHeld { product_id, until });
                }
            }
        }

        // Same session, still-valid hold: extend in place rather than error.
        let existing_id = inner
            .reservations
            .values()
            .find(|r| {
                r.product_id == product_id
                    && &r.session_id == session_id
                    && r.status == ReservationStatus::Active
                    && r.expires_at > now
            })
            .map(|r| r.id);
        let reservation = if let Some(id) = existing_id {
            let existing = inner
                .reservations
                .get_mut(&id)
                .ok_or_else(|| StoreError::Backend("reservation vanished mid-update".into()))?;
            existing.expires_at = expires_at;
            existing.clone()
        } else {
            let reservation = Reservation {
                id: Uuid::new_v4(),
                product_id,
                session_id: session_id.clone(),
                created_at: now,
                expires_at,
                status: ReservationStatus::Active,
            };
            inner.reservations.insert(reservation.id, reservation.clone());
            reservation
        };

        let product = inner
            .products
            .get_mut(&product_id)
            .ok_or(StoreError::ProductNotFound(product_id))?;
        product.reserved_until = Some(expires_at);
        product.reserved_by_session = Some(session_id.clone());

        Ok(reservation)
    }

    async fn list_active(&self, session_id: &SessionId) -> Result<Vec<Reservation>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let mut active: Vec<Reservation> = inner
            .reservations
            .values()
            .filter(|r| &r.session_id == session_id && r.is_holding(now))
            .cloned()
            .collect();
        active.sort_by_key(|r| r.created_at);
        Ok(active)
    }

    async fn release(&self, session_id: &SessionId, product_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();

        let released = inner
            .reservations
            .values_mut()
            .find(|r| {
                r.product_id == product_id
                    && &r.session_id == session_id
                    && r.status == ReservationStatus::Active
            })
            .map(|r| {
                r.status = ReservationStatus::Expired;
                true
            })
            .unwrap_or(false);

        // Clear the availability fields only if they still point at this
        // session; a newer reservation must not be clobbered by a stale
        // releaser.
        if let Some(product) = inner.products.get_mut(&product_id) {
            if product.reserved_by_session.as_ref() == Some(session_id) {
                product.reserved_until = None;
                product.reserved_by_session = None;
            }
        }

        Ok(released)
    }

    async fn complete(
        &self,
        session_id: &SessionId,
        product_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();

        for &product_id in product_ids {
            if let Some(reservation) = inner.reservations.values_mut().find(|r| {
                r.product_id == product_id
                    && &r.session_id == session_id
                    && r.status == ReservationStatus::Active
            }) {
                reservation.status = ReservationStatus::Completed;
            }

            let product = inner
                .products
                .get_mut(&product_id)
                .ok_or(StoreError::ProductNotFound(product_id))?;
            if let Some(holder) = &product.reserved_by_session {
                if holder != session_id {
                    tracing::warn!(
                        product_id = %product_id,
                        "Completing a sale for a product whose hold points at another session"
                    );
                }
            }
            product.sold = true;
            if product.reserved_by_session.as_ref() == Some(session_id) {
                product.reserved_until = None;
                product.reserved_by_session = None;
            }
        }

        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut summary = SweepSummary::default();

        let lapsed: Vec<(Uuid, Uuid, SessionId)> = inner
            .reservations
            .values()
            .filter(|r| r.status == ReservationStatus::Active && r.expires_at <= now)
            .map(|r| (r.id, r.product_id, r.session_id.clone()))
            .collect();

        for (reservation_id, product_id, session_id) in lapsed {
            match inner.reservations.get_mut(&reservation_id) {
                Some(r) if r.status == ReservationStatus::Active && r.expires_at <= now => {
                    r.status = ReservationStatus::Expired;
                    summary.reservations_expired += 1;
                }
                _ => continue,
            }

            if let Some(product) = inner.products.get_mut(&product_id) {
                // Same guard as `release`: only clear fields that still point
                // at the lapsed session and are themselves lapsed, so a hold
                // created after this one lapsed is left alone.
                let same_session = product.reserved_by_session.as_ref() == Some(&session_id);
                let still_lapsed = product.reserved_until.is_some_and(|until| until <= now);
                if same_session && still_lapsed {
                    product.reserved_until = None;
                    product.reserved_by_session = None;
                    summary.products_released += 1;
                    summary.released_products.push(product_id);
                }
            }
        }

        Ok(summary)
    }
}

#[async_trait]
impl ProductRepository for MemoryStore {
    async fn create(&self, product: &Product) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.products.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Product>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut products: Vec<Product> = inner.products.values().cloned().collect();
        products.sort_by_key(|p| p.created_at);
        Ok(products)
    }

    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let product = inner
            .products
            .get_mut(&id)
            .ok_or(StoreError::ProductNotFound(id))?;
        product.sold = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    async fn seed(store: &MemoryStore) -> Product {
        let product = Product::new("oak-stool", "Oak Stool", "Ines", 14_500);
        store.create(&product).await.unwrap();
        product
    }

    #[tokio::test]
    async fn second_session_gets_already_held() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let a = SessionId::generate();
        let b = SessionId::generate();

        let held = store
            .reserve(product.id, &a, Duration::minutes(15))
            .await
            .unwrap();

        let err = store
            .reserve(product.id, &b, Duration::minutes(15))
            .await
            .unwrap_err();
        match err {
            StoreError::AlreadyHeld { until, .. } => assert_eq!(until, held.expires_at),
            other => panic!("expected AlreadyHeld, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_session_reserve_extends_the_existing_hold() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let session = SessionId::generate();

        let first = store
            .reserve(product.id, &session, Duration::minutes(15))
            .await
            .unwrap();
        let second = store
            .reserve(product.id, &session, Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert!(second.expires_at >= first.expires_at);
        assert_eq!(store.list_active(&session).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn lapsed_hold_is_reclaimable_before_any_sweep() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let a = SessionId::generate();
        let b = SessionId::generate();

        // Negative hold: lapses immediately, fields left stale-held.
        store
            .reserve(product.id, &a, Duration::seconds(-5))
            .await
            .unwrap();
        assert!(store.list_active(&a).await.unwrap().is_empty());

        let reclaimed = store
            .reserve(product.id, &b, Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(reclaimed.session_id, b);

        let stored = store.get(product.id).await.unwrap().unwrap();
        assert!(stored.held_by(&b, Utc::now()));
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let session = SessionId::generate();

        store
            .reserve(product.id, &session, Duration::minutes(15))
            .await
            .unwrap();

        assert!(store.release(&session, product.id).await.unwrap());
        assert!(!store.release(&session, product.id).await.unwrap());

        let stored = store.get(product.id).await.unwrap().unwrap();
        assert!(stored.reserved_until.is_none());
        assert!(stored.reserved_by_session.is_none());
        assert!(store.list_active(&session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_release_does_not_clobber_newer_hold() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let a = SessionId::generate();
        let b = SessionId::generate();

        store
            .reserve(product.id, &a, Duration::seconds(-5))
            .await
            .unwrap();
        store
            .reserve(product.id, &b, Duration::minutes(15))
            .await
            .unwrap();

        // A's late release expires its own lapsed row but must leave B's
        // hold on the product untouched.
        store.release(&a, product.id).await.unwrap();

        let stored = store.get(product.id).await.unwrap().unwrap();
        assert!(stored.held_by(&b, Utc::now()));
    }

    #[tokio::test]
    async fn sweep_releases_lapsed_and_spares_valid_holds() {
        let store = MemoryStore::new();
        let lapsed = seed(&store).await;
        let valid = Product::new("wool-rug", "Wool Rug", "Sami", 32_000);
        store.create(&valid).await.unwrap();
        let a = SessionId::generate();
        let b = SessionId::generate();

        store
            .reserve(lapsed.id, &a, Duration::seconds(-5))
            .await
            .unwrap();
        store
            .reserve(valid.id, &b, Duration::minutes(15))
            .await
            .unwrap();

        let summary = store.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(summary.reservations_expired, 1);
        assert_eq!(summary.products_released, 1);
        assert_eq!(summary.released_products, vec![lapsed.id]);

        let still_held = store.get(valid.id).await.unwrap().unwrap();
        assert!(still_held.held_by(&b, Utc::now()));

        // Re-running over the same state is a no-op.
        let rerun = store.sweep_expired(Utc::now()).await.unwrap();
        assert_eq!(rerun.reservations_expired, 0);
        assert_eq!(rerun.products_released, 0);
    }

    #[tokio::test]
    async fn sweep_does_not_clobber_a_replacement_hold() {
        let store = MemoryStore::new();
        let product = seed(&store).await;
        let a = SessionId::generate();
        let b = SessionId::generate();

        // A's hold lapses; B reclaims the product before the sweep runs.
        store
            .reserve(product.id, &a, Duration::seconds(-5))
            .await
            .unwrap();
        store
            .reserve(product.id, &b, Duration::minutes(15))
            .await
            .unwrap();

        let summary = store.sweep_expired(Utc::now()).await.unwrap();

        // A's lapsed row is expired, but the product now points at B and
        // must not be released.
        assert_eq!(summary.reservations_expired, 1);
        assert_eq!(summary.products_released, 0);
        let stored = store.get(product.id).await.unwrap().unwrap();
        assert!(stored.held_by(&b, Utc::now()));
    }

    #[tokio::test]
    async fn complete_consumes_holds_and_marks_products_sold() {
        let store = MemoryStore::new();
        let p1 = seed(&store).await;
        let p2 = Product::new("clay-mug", "Clay Mug", "Ren", 3_900);
        store.create(&p2).await.unwrap();
        let session = SessionId::generate();

        store
            .reserve(p1.id, &session, Duration::minutes(15))
            .await
            .unwrap();
        store
            .reserve(p2.id, &session, Duration::minutes(15))
            .await
            .unwrap();

        store.complete(&session, &[p1.id, p2.id]).await.unwrap();
        // Redelivery of the same completion is a safe no-op.
        store.complete(&session, &[p1.id, p2.id]).await.unwrap();

        assert!(store.list_active(&session).await.unwrap().is_empty());
        for id in [p1.id, p2.id] {
            let stored = store.get(id).await.unwrap().unwrap();
            assert!(stored.sold);
            assert!(stored.reserved_until.is_none());
        }

        // Sold items never return to the available pool.
        let err = store
            .reserve(p1.id, &SessionId::generate(), Duration::minutes(15))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Sold(_)));
    }

    #[tokio::test]
    async fn concurrent_reserves_produce_exactly_one_winner() {
        let store = Arc::new(MemoryStore::new());
        let product = seed(&store).await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let product_id = product.id;
            handles.push(tokio::spawn(async move {
                let session = SessionId::generate();
                store
                    .reserve(product_id, &session, Duration::minutes(15))
                    .await
                    .is_ok()
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
