use axum::{
    extract::State,
    http::Method,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod orders;
pub mod products;
pub mod reservations;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::HeaderName::from_static(reservations::SESSION_HEADER),
        ]);

    Router::new()
        .route(
            "/v1/reservations",
            post(reservations::reserve).get(reservations::list_active),
        )
        .route(
            "/v1/reservations/{product_id}",
            axum::routing::delete(reservations::release),
        )
        .route("/v1/products", get(products::list_products))
        .route(
            "/v1/products/{product_id}/availability",
            get(products::availability),
        )
        .route("/v1/products/{product_id}/stream", get(products::stream))
        .route("/v1/checkout", post(orders::begin_checkout))
        .route("/v1/orders/{order_id}", get(orders::get_order))
        .route("/v1/webhooks/payments", post(webhooks::handle_payment_webhook))
        .route("/v1/internal/sweep", post(worker::trigger_sweep))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<impl IntoResponse, impl IntoResponse> {
    let Some(redis) = &state.redis else {
        return Ok(next.run(req).await);
    };

    // One bucket per session (the id every reservation call carries), so a
    // single misbehaving tab cannot hammer the store.
    let bucket = req
        .headers()
        .get(reservations::SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();
    let key = format!("ratelimit:{}", bucket);

    match redis.check_rate_limit(&key, 100, 60).await {
        Ok(true) => Ok(next.run(req).await),
        Ok(false) => Err((
            axum::http::StatusCode::TOO_MANY_REQUESTS,
            "Rate limit exceeded",
        )),
        Err(_) => Ok(next.run(req).await), // Fail open
    }
}
