use atelier_core::session::SessionId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cache::CartCache;
use crate::client::ReservationApi;
use crate::models::CartNotice;

/// Periodic revalidation of the local mirror against the authoritative
/// store.
///
/// Runs on a slower cadence than the countdown while the shopper has items
/// in cart. A failed authoritative read degrades to "try again next pass";
/// disagreements are resolved silently unless an eviction results, in which
/// case one aggregated notice is surfaced for the whole pass.
pub struct Reconciler {
    session_id: SessionId,
    cache: Arc<Mutex<CartCache>>,
    api: Arc<dyn ReservationApi>,
    notices: mpsc::UnboundedSender<CartNotice>,
    period: std::time::Duration,
}

impl Reconciler {
    pub fn new(
        session_id: SessionId,
        cache: Arc<Mutex<CartCache>>,
        api: Arc<dyn ReservationApi>,
        notices: mpsc::UnboundedSender<CartNotice>,
        period: std::time::Duration,
    ) -> Self {
        Self {
            session_id,
            cache,
            api,
            notices,
            period,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_pass().await,
                }
            }
        })
    }

    pub async fn run_pass(&self) {
        if self.cache.lock().await.is_empty() {
            return;
        }

        let authoritative = match self.api.list_active(&self.session_id).await {
            Ok(reservations) => reservations,
            Err(e) => {
                tracing::debug!(error = %e, "Reconciliation read failed; next pass retries");
                return;
            }
        };

        let outcome = {
            let mut cache = self.cache.lock().await;
            cache.apply_authoritative(&authoritative, Utc::now())
        };

        if outcome.corrected > 0 {
            tracing::debug!(corrected = outcome.corrected, "Adopted store expiry values");
        }
        if !outcome.removed.is_empty() {
            let _ = self.notices.send(CartNotice::ItemsRemoved {
                count: outcome.removed.len(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DirectReservationApi;
    use crate::models::CartItem;
    use atelier_catalog::{MemoryStore, Product, ProductRepository};
    use atelier_core::repository::ReservationRepository;
    use chrono::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn pass_drops_stale_lines_and_keeps_fresh_ones() {
        let store = Arc::new(MemoryStore::new());
        let product = Product::new("indigo-scarf", "Indigo Scarf", "Noor", 9_800);
        store.create(&product).await.unwrap();

        let session = SessionId::generate();
        let api: Arc<dyn ReservationApi> = Arc::new(DirectReservationApi::new(
            store.clone() as Arc<dyn ReservationRepository>,
            Duration::minutes(15),
        ));

        // One real hold, plus a phantom line the store never saw.
        let reservation = api.reserve(&session, product.id).await.unwrap();
        let cache = Arc::new(Mutex::new(CartCache::new(
            session.clone(),
            Duration::seconds(5),
        )));
        {
            let mut cache = cache.lock().await;
            cache.insert(CartItem::from_reservation(
                &reservation,
                &product.name,
                product.price_cents,
            ));
            cache.insert(CartItem {
                product_id: Uuid::new_v4(),
                session_id: session.clone(),
                name: "Phantom".to_string(),
                price_cents: 1_000,
                reserved_until: Utc::now() - Duration::seconds(30),
                added_at: Utc::now() - Duration::minutes(20),
            });
        }

        let (notices, mut notice_rx) = mpsc::unbounded_channel();
        let reconciler = Reconciler::new(
            session.clone(),
            cache.clone(),
            api,
            notices,
            std::time::Duration::from_secs(45),
        );

        reconciler.run_pass().await;

        assert_eq!(
            notice_rx.recv().await,
            Some(CartNotice::ItemsRemoved { count: 1 })
        );
        let cache = cache.lock().await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.items()[0].product_id, product.id);
    }

    #[tokio::test]
    async fn fresh_local_hold_survives_an_empty_authoritative_read() {
        let store = Arc::new(MemoryStore::new());
        let session = SessionId::generate();
        let api: Arc<dyn ReservationApi> = Arc::new(DirectReservationApi::new(
            store as Arc<dyn ReservationRepository>,
            Duration::minutes(15),
        ));

        let cache = Arc::new(Mutex::new(CartCache::new(
            session.clone(),
            Duration::seconds(5),
        )));
        // Simulates the write-after-read race right after `reserve`: the
        // line exists locally, the authoritative read does not show it yet.
        cache.lock().await.insert(CartItem {
            product_id: Uuid::new_v4(),
            session_id: session.clone(),
            name: "Fresh".to_string(),
            price_cents: 2_000,
            reserved_until: Utc::now() + Duration::minutes(14),
            added_at: Utc::now(),
        });

        let (notices, mut notice_rx) = mpsc::unbounded_channel();
        Reconciler::new(
            session,
            cache.clone(),
            api,
            notices,
            std::time::Duration::from_secs(45),
        )
        .run_pass()
        .await;

        assert!(notice_rx.try_recv().is_err());
        assert_eq!(cache.lock().await.len(), 1);
    }
}
