use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::payment::{CartSnapshot, SnapshotItem};
use atelier_order::Order;

use crate::error::AppError;
use crate::reservations::ShopperSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BeginCheckoutRequest {
    pub items: Vec<SnapshotItem>,
}

#[derive(Debug, Serialize)]
pub struct BeginCheckoutResponse {
    pub intent_id: String,
    pub amount_cents: i64,
    pub currency: String,
    pub client_secret: Option<String>,
}

/// POST /v1/checkout
/// Open a payment intent for the session's cart. The snapshot and session
/// id ride in the intent metadata; the webhook finalizer reads them back.
pub async fn begin_checkout(
    State(state): State<AppState>,
    ShopperSession(session_id): ShopperSession,
    Json(req): Json<BeginCheckoutRequest>,
) -> Result<Json<BeginCheckoutResponse>, AppError> {
    if req.items.is_empty() {
        return Err(AppError::BadRequest("Cart is empty".to_string()));
    }

    // Only still-held items can be paid for; a lapsed hold means another
    // shopper may already have the piece.
    let active = state.reservations.list_active(&session_id).await?;
    for item in &req.items {
        if !active.iter().any(|r| r.product_id == item.product_id) {
            return Err(AppError::Conflict {
                message: format!("Hold on {} has lapsed; refresh your cart", item.name),
                held_until: None,
            });
        }
    }

    let snapshot = CartSnapshot { items: req.items };
    let intent = state
        .payments
        .begin_checkout(&session_id, &snapshot, &state.currency)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;

    Ok(Json(BeginCheckoutResponse {
        intent_id: intent.id,
        amount_cents: intent.amount_cents,
        currency: intent.currency,
        client_secret: intent.client_secret,
    }))
}

/// GET /v1/orders/{id}
/// Order details for the confirmation page.
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = state
        .orders
        .get(order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {order_id} not found")))?;
    Ok(Json(order))
}
