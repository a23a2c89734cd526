use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use chrono::Utc;
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use atelier_catalog::{Availability, Product};
use atelier_shared::models::events::AvailabilityEvent;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub maker: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    pub availability: Availability,
}

impl ProductResponse {
    fn from_product(product: Product) -> Self {
        let availability = product.availability(Utc::now());
        Self {
            id: product.id,
            slug: product.slug,
            name: product.name,
            maker: product.maker,
            description: product.description,
            price_cents: product.price_cents,
            currency: product.currency,
            availability,
        }
    }
}

/// GET /v1/products
/// The storefront grid's data: every listing with its availability view.
pub async fn list_products(
    State(state): State<AppState>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = state.products.list().await?;
    Ok(Json(
        products
            .into_iter()
            .map(ProductResponse::from_product)
            .collect(),
    ))
}

/// GET /v1/products/{id}/availability
/// Cheap read for product pages: cache first, store on miss.
pub async fn availability(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<Json<Availability>, AppError> {
    if let Some(redis) = &state.redis {
        match redis.get_availability(&product_id.to_string()).await {
            Ok(Some(cached)) => {
                if let Ok(view) = serde_json::from_str::<Availability>(&cached) {
                    return Ok(Json(view));
                }
            }
            Ok(None) => {}
            Err(e) => tracing::debug!(error = %e, "Availability cache read failed"),
        }
    }

    let product = state
        .products
        .get(product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {product_id} not found")))?;
    let view = product.availability(Utc::now());

    if let Some(redis) = &state.redis {
        if let Ok(payload) = serde_json::to_string(&view) {
            if let Err(e) = redis
                .cache_availability(&product_id.to_string(), &payload, state.rules.hold_seconds)
                .await
            {
                tracing::debug!(error = %e, "Availability cache write failed");
            }
        }
    }

    Ok(Json(view))
}

/// GET /v1/products/{id}/stream
/// Live availability transitions for one product page, so it can flip to
/// "just taken" without polling.
pub async fn stream(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.stream_tx.subscribe();

    let stream =
        tokio_stream::wrappers::BroadcastStream::new(rx).filter_map(move |result| async move {
            match result {
                Ok(event) if event.product_id() == product_id => Event::default()
                    .event("availability")
                    .json_data(&event)
                    .ok()
                    .map(Ok),
                _ => None,
            }
        });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Push an availability transition to SSE subscribers and drop the stale
/// cache entry so the next page read re-seeds it.
pub async fn announce(state: &AppState, event: AvailabilityEvent) {
    let _ = state.stream_tx.send(event.clone());
    if let Some(redis) = &state.redis {
        if let Err(e) = redis
            .clear_availability(&event.product_id().to_string())
            .await
        {
            tracing::debug!(error = %e, "Availability cache invalidation failed");
        }
    }
}
