use atelier_catalog::ProductRepository;
use atelier_core::repository::ReservationRepository;
use atelier_order::{CheckoutFinalizer, OrderRepository, PaymentOrchestrator};
use atelier_shared::models::events::AvailabilityEvent;
use atelier_store::app_config::ReservationRules;
use atelier_store::{EventProducer, RedisClient};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub reservations: Arc<dyn ReservationRepository>,
    pub products: Arc<dyn ProductRepository>,
    pub orders: Arc<dyn OrderRepository>,
    pub finalizer: Arc<CheckoutFinalizer>,
    pub payments: Arc<PaymentOrchestrator>,
    /// None disables the availability cache and rate limiting (local dev,
    /// tests).
    pub redis: Option<Arc<RedisClient>>,
    /// None disables event publishing.
    pub events: Option<Arc<EventProducer>>,
    /// Feeds the per-product SSE streams.
    pub stream_tx: broadcast::Sender<AvailabilityEvent>,
    pub rules: ReservationRules,
    pub currency: String,
    pub webhook_secret: String,
}
