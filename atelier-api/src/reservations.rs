use axum::{
    extract::{Path, State},
    http::request::Parts,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use atelier_core::reservation::Reservation;
use atelier_core::session::SessionId;
use atelier_shared::models::events::{AvailabilityEvent, HoldPlacedEvent, HoldReleasedEvent};
use atelier_store::events::TOPIC_RESERVATIONS;

use crate::error::AppError;
use crate::products::announce;
use crate::state::AppState;

pub const SESSION_HEADER: &str = "x-shopper-session";

/// Extracts the anonymous shopper session id from the request headers. The
/// id is opaque and minted client-side; the store only ever compares it.
pub struct ShopperSession(pub SessionId);

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for ShopperSession {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|raw| !raw.is_empty())
            .map(|raw| ShopperSession(SessionId::from(raw)))
            .ok_or((StatusCode::BAD_REQUEST, "Missing x-shopper-session header"))
    }
}

#[derive(Debug, Deserialize)]
pub struct ReserveRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub product_id: Uuid,
    pub session_id: String,
    /// Copied into the client mirror; always an explicit-zone instant.
    pub reserved_until: DateTime<Utc>,
    pub status: String,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            product_id: r.product_id,
            session_id: r.session_id.to_string(),
            reserved_until: r.expires_at,
            status: r.status.as_str().to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub released: bool,
}

/// POST /v1/reservations
/// Place a hold on a product for this session.
pub async fn reserve(
    State(state): State<AppState>,
    ShopperSession(session_id): ShopperSession,
    Json(req): Json<ReserveRequest>,
) -> Result<Json<ReservationResponse>, AppError> {
    let reservation = state
        .reservations
        .reserve(req.product_id, &session_id, state.rules.hold_duration())
        .await?;

    announce(
        &state,
        AvailabilityEvent::Held {
            product_id: reservation.product_id,
            until: reservation.expires_at.timestamp(),
        },
    )
    .await;
    if let Some(events) = &state.events {
        events
            .publish_json(
                TOPIC_RESERVATIONS,
                &reservation.product_id.to_string(),
                &HoldPlacedEvent {
                    product_id: reservation.product_id,
                    session_id: session_id.to_string(),
                    expires_at: reservation.expires_at.timestamp(),
                    timestamp: Utc::now().timestamp(),
                },
            )
            .await;
    }

    Ok(Json(reservation.into()))
}

/// GET /v1/reservations
/// The session's current holds; drives reconciliation.
pub async fn list_active(
    State(state): State<AppState>,
    ShopperSession(session_id): ShopperSession,
) -> Result<Json<Vec<ReservationResponse>>, AppError> {
    let reservations = state.reservations.list_active(&session_id).await?;
    Ok(Json(
        reservations.into_iter().map(ReservationResponse::from).collect(),
    ))
}

/// DELETE /v1/reservations/{product_id}
/// Release this session's hold. Safe to repeat.
pub async fn release(
    State(state): State<AppState>,
    ShopperSession(session_id): ShopperSession,
    Path(product_id): Path<Uuid>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state.reservations.release(&session_id, product_id).await?;

    if released {
        announce(&state, AvailabilityEvent::Released { product_id }).await;
        if let Some(events) = &state.events {
            events
                .publish_json(
                    TOPIC_RESERVATIONS,
                    &product_id.to_string(),
                    &HoldReleasedEvent {
                        product_id,
                        session_id: session_id.to_string(),
                        cause: "released".to_string(),
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;
        }
    }

    Ok(Json(ReleaseResponse { released }))
}

