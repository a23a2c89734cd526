//! A complete cart session against the in-memory store: add a piece with a
//! short hold, watch the countdown tick down and evict it after the
//! debounce recheck, with the reconciler running alongside.
//!
//! Run with: cargo run -p atelier-cart --example cart_session

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use atelier_cart::{Cart, CartNotice, CountdownConfig, CountdownTicker, Reconciler};
use atelier_cart::client::{DirectReservationApi, ReservationApi};
use atelier_catalog::{MemoryStore, Product, ProductRepository};
use atelier_core::repository::ReservationRepository;
use atelier_core::session::SessionId;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter("atelier_cart=debug")
        .init();

    let store = Arc::new(MemoryStore::new());
    let product = Product::new("walnut-serving-board", "Walnut Serving Board", "Ada", 12_500);
    store.create(&product).await.unwrap();

    let session = SessionId::generate();
    let api: Arc<dyn ReservationApi> = Arc::new(DirectReservationApi::new(
        store.clone() as Arc<dyn ReservationRepository>,
        chrono::Duration::seconds(4),
    ));

    let cart = Cart::new(session.clone(), api.clone(), chrono::Duration::seconds(1));
    let item = cart
        .add(product.id, &product.name, product.price_cents)
        .await
        .unwrap();
    println!("Added {}, hold until {}", item.name, item.reserved_until);

    let (updates_tx, mut updates_rx) = broadcast::channel(16);
    let (notices_tx, mut notices_rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();

    let ticker = CountdownTicker::new(
        session.clone(),
        cart.cache(),
        api.clone(),
        updates_tx,
        notices_tx.clone(),
        CountdownConfig {
            tick: std::time::Duration::from_millis(500),
            ..CountdownConfig::default()
        },
    )
    .spawn(cancel.clone());

    let reconciler = Reconciler::new(
        session,
        cart.cache(),
        api,
        notices_tx,
        std::time::Duration::from_secs(2),
    )
    .spawn(cancel.clone());

    loop {
        tokio::select! {
            Ok(state) = updates_rx.recv() => {
                println!("{}s remaining ({:?})", state.remaining_seconds, state.urgency);
            }
            Some(notice) = notices_rx.recv() => {
                match notice {
                    CartNotice::HoldExpired { product_ids } => {
                        println!("Hold expired on {} item(s); cart is empty again", product_ids.len());
                        break;
                    }
                    CartNotice::ItemsRemoved { count } => {
                        println!("Reconciliation removed {count} item(s)");
                    }
                }
            }
        }
    }

    cancel.cancel();
    let _ = ticker.await;
    let _ = reconciler.await;
}
