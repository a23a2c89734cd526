use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use atelier_api::{app, worker, AppState};
use atelier_core::notify::LogNotifier;
use atelier_order::{CheckoutFinalizer, MockPaymentAdapter, PaymentOrchestrator};
use atelier_store::{
    DbClient, EventProducer, PgOrderRepository, PgProductRepository, PgReservationRepository,
    RedisClient,
};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "atelier_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = atelier_store::app_config::Config::load().expect("Failed to load config");
    tracing::info!("Starting Atelier API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url)
        .await
        .expect("Failed to connect to Postgres");
    db.migrate().await.expect("Failed to run migrations");

    let redis = if config.redis.url.is_empty() {
        tracing::warn!("Redis disabled; availability cache and rate limiting are off");
        None
    } else {
        Some(Arc::new(
            RedisClient::new(&config.redis.url)
                .await
                .expect("Failed to connect to Redis"),
        ))
    };

    let events = if config.kafka.brokers.is_empty() {
        tracing::warn!("Kafka disabled; domain events will not be published");
        None
    } else {
        Some(Arc::new(
            EventProducer::new(&config.kafka.brokers).expect("Failed to create Kafka producer"),
        ))
    };

    let reservations = Arc::new(PgReservationRepository::new(db.pool.clone()));
    let products = Arc::new(PgProductRepository::new(db.pool.clone()));
    let orders = Arc::new(PgOrderRepository::new(db.pool.clone()));
    let finalizer = Arc::new(CheckoutFinalizer::new(
        reservations.clone(),
        products.clone(),
        orders.clone(),
        Arc::new(LogNotifier),
    ));
    // The mock adapter stands in until a real provider adapter is wired.
    let payments = Arc::new(PaymentOrchestrator::new(Arc::new(MockPaymentAdapter::new())));

    let (stream_tx, _) = tokio::sync::broadcast::channel(100);

    let app_state = AppState {
        reservations,
        products,
        orders,
        finalizer,
        payments,
        redis,
        events,
        stream_tx,
        rules: config.reservations.clone(),
        currency: config.payments.currency.clone(),
        webhook_secret: config.payments.webhook_secret.clone(),
    };

    // The sweep is its own cancellable task; expiry is enforced even when no
    // client is connected.
    let cancel = CancellationToken::new();
    let sweep = worker::spawn_sweep(
        app_state.clone(),
        config.reservations.sweep_interval(),
        cancel.clone(),
    );

    let app = app(app_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .expect("Server error");

    cancel.cancel();
    let _ = sweep.await;
}
