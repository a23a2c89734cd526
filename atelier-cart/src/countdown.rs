use atelier_core::session::SessionId;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::CartCache;
use crate::client::ReservationApi;
use crate::models::{CartNotice, CountdownState};

#[derive(Debug, Clone)]
pub struct CountdownConfig {
    /// Recompute cadence; once per second in production.
    pub tick: std::time::Duration,
    pub warn_below: chrono::Duration,
    pub critical_below: chrono::Duration,
}

impl Default for CountdownConfig {
    fn default() -> Self {
        Self {
            tick: std::time::Duration::from_secs(1),
            warn_below: chrono::Duration::minutes(5),
            critical_below: chrono::Duration::minutes(2),
        }
    }
}

/// The per-session countdown actor.
///
/// Every tick it recomputes the minimum remaining time across the cart,
/// publishes a display frame, and evicts items whose lapse survived the
/// debounce recheck. Runs as its own cancellable task so a failure here
/// cannot take the reconciler or the server sweep down with it.
pub struct CountdownTicker {
    session_id: SessionId,
    cache: Arc<Mutex<CartCache>>,
    api: Arc<dyn ReservationApi>,
    updates: broadcast::Sender<CountdownState>,
    notices: mpsc::UnboundedSender<CartNotice>,
    config: CountdownConfig,
}

impl CountdownTicker {
    pub fn new(
        session_id: SessionId,
        cache: Arc<Mutex<CartCache>>,
        api: Arc<dyn ReservationApi>,
        updates: broadcast::Sender<CountdownState>,
        notices: mpsc::UnboundedSender<CartNotice>,
        config: CountdownConfig,
    ) -> Self {
        Self {
            session_id,
            cache,
            api,
            updates,
            notices,
            config,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.tick);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => self.run_tick().await,
                }
            }
        })
    }

    async fn run_tick(&self) {
        let now = Utc::now();

        let ready = {
            let mut cache = self.cache.lock().await;
            cache.lapsed_after_debounce(now)
        };

        let mut evicted: Vec<Uuid> = Vec::new();
        for product_id in ready {
            // Release first; on failure the item stays in the cart and the
            // next tick retries rather than surfacing a hard error.
            match self.api.release(&self.session_id, product_id).await {
                Ok(_) => {
                    if self.cache.lock().await.remove(&product_id).is_some() {
                        evicted.push(product_id);
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        product_id = %product_id,
                        error = %e,
                        "Release after local expiry failed; retrying next tick"
                    );
                }
            }
        }

        if !evicted.is_empty() {
            let _ = self.notices.send(CartNotice::HoldExpired {
                product_ids: evicted,
            });
        }

        let remaining = self.cache.lock().await.remaining(now);
        if let Some(remaining) = remaining {
            let _ = self.updates.send(CountdownState::new(
                remaining,
                self.config.warn_below,
                self.config.critical_below,
            ));
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

    #[tokio::test]
    async fn locally_lapsed_item_is_released_and_evicted_after_debounce() {
        let store = Arc::new(MemoryStore::new());
        let product = Product::new("brass-candlestick", "Brass Candlestick", "Otto", 7_700);
        store.create(&product).await.unwrap();

        let session = SessionId::generate();
        let api: Arc<dyn ReservationApi> = Arc::new(DirectReservationApi::new(
            store.clone() as Arc<dyn ReservationRepository>,
            Duration::milliseconds(50),
        ));

        let reservation = api.reserve(&session, product.id).await.unwrap();
        let cache = Arc::new(Mutex::new(CartCache::new(
            session.clone(),
            Duration::milliseconds(40),
        )));
        cache
            .lock()
            .await
            .insert(CartItem::from_reservation(&reservation, &product.name, product.price_cents));

        let (updates, _) = broadcast::channel(16);
        let (notices, mut notice_rx) = mpsc::unbounded_channel();
        let config = CountdownConfig {
            tick: std::time::Duration::from_millis(10),
            ..CountdownConfig::default()
        };

        let cancel = CancellationToken::new();
        let handle = CountdownTicker::new(
            session.clone(),
            cache.clone(),
            api.clone(),
            updates,
            notices,
            config,
        )
        .spawn(cancel.clone());

        let notice = tokio::time::timeout(std::time::Duration::from_secs(2), notice_rx.recv())
            .await
            .expect("eviction notice before timeout")
            .expect("channel open");
        assert_eq!(
            notice,
            CartNotice::HoldExpired {
                product_ids: vec![product.id]
            }
        );

        cancel.cancel();
        handle.await.unwrap();

        assert!(cache.lock().await.is_empty());
        assert!(store.list_active(&session).await.unwrap().is_empty());
        let stored = store.get(product.id).await.unwrap().unwrap();
        assert!(stored.reserved_by_session.is_none());
    }
}
