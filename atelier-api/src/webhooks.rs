use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use atelier_core::payment::{CartSnapshot, PaymentOutcome, PaymentStatus};
use atelier_core::session::SessionId;
use atelier_shared::models::events::{AvailabilityEvent, HoldReleasedEvent, OrderConfirmedEvent};
use atelier_shared::pii::Masked;
use atelier_store::events::{TOPIC_ORDERS, TOPIC_RESERVATIONS};

use crate::products::announce;
use crate::state::AppState;

pub const SIGNATURE_HEADER: &str = "atelier-signature";

/// Events older than this are rejected to prevent replays.
const MAX_SIGNATURE_AGE_SECONDS: i64 = 300;

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookData,
}

#[derive(Debug, Deserialize)]
pub struct WebhookData {
    pub object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
pub struct PaymentIntentObject {
    pub id: String,
    pub status: String,
    pub metadata: Option<serde_json::Value>,
}

/// Verify the processor's `t=...,v1=...` signature header (HMAC-SHA256 over
/// `"{timestamp}.{body}"`, hex-encoded, constant-time comparison).
pub fn verify_signature(payload: &[u8], sig_header: &str, secret: &str) -> Result<(), &'static str> {
    let mut timestamp = "";
    let mut signature = "";
    for part in sig_header.split(',') {
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = t;
        } else if let Some(v) = part.strip_prefix("v1=") {
            signature = v;
        }
    }

    if timestamp.is_empty() || signature.is_empty() {
        return Err("Malformed signature header");
    }

    let signed_payload = format!("{timestamp}.{}", std::str::from_utf8(payload).unwrap_or(""));
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map_err(|_| "HMAC key error")?;
    mac.update(signed_payload.as_bytes());

    let sig_bytes = hex::decode(signature).map_err(|_| "Invalid signature hex")?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| "Signature mismatch")?;

    let ts: i64 = timestamp.parse().map_err(|_| "Invalid timestamp")?;
    let now = Utc::now().timestamp();
    if (now - ts).abs() > MAX_SIGNATURE_AGE_SECONDS {
        return Err("Signature timestamp too old");
    }

    Ok(())
}

/// Decode the webhook into the finalizer's input. The session id and cart
/// snapshot ride in the intent metadata, put there at checkout start.
pub fn parse_outcome(webhook: &PaymentWebhook) -> Result<PaymentOutcome, &'static str> {
    let status = match webhook.type_.as_str() {
        "payment_intent.succeeded" => PaymentStatus::Succeeded,
        "payment_intent.payment_failed" => PaymentStatus::Failed,
        "payment_intent.canceled" => PaymentStatus::Canceled,
        _ => return Err("Unhandled event type"),
    };

    let metadata = webhook
        .data
        .object
        .metadata
        .as_ref()
        .ok_or("Missing intent metadata")?;

    let session_id = metadata["session_id"]
        .as_str()
        .filter(|raw| !raw.is_empty())
        .map(SessionId::from)
        .ok_or("Missing session_id in metadata")?;

    let snapshot: CartSnapshot = serde_json::from_value(metadata["cart"].clone())
        .map_err(|_| "Malformed cart snapshot in metadata")?;

    let customer_email = metadata["customer_email"]
        .as_str()
        .map(|raw| Masked::new(raw.to_string()));

    Ok(PaymentOutcome {
        intent_id: webhook.data.object.id.clone(),
        session_id,
        status,
        snapshot,
        customer_email,
    })
}

/// POST /v1/webhooks/payments
/// Signature-verified payment outcome; the checkout finalizer is the sole
/// consumer. Idempotent under the processor's redelivery.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, StatusCode> {
    let sig_header = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(StatusCode::BAD_REQUEST)?;

    if let Err(reason) = verify_signature(&body, sig_header, &state.webhook_secret) {
        tracing::warn!(reason, "Rejected payment webhook");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let webhook: PaymentWebhook =
        serde_json::from_slice(&body).map_err(|_| StatusCode::BAD_REQUEST)?;
    tracing::info!(
        event = %webhook.type_,
        intent_id = %webhook.data.object.id,
        "Received payment webhook"
    );

    let outcome = match parse_outcome(&webhook) {
        Ok(outcome) => outcome,
        Err("Unhandled event type") => return Ok(StatusCode::OK),
        Err(reason) => {
            tracing::warn!(reason, "Unusable payment webhook payload");
            return Err(StatusCode::BAD_REQUEST);
        }
    };

    let report = state.finalizer.handle_outcome(&outcome).await.map_err(|e| {
        tracing::error!(error = %e, "Finalizer failed; processor will redeliver");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if report.already_processed {
        return Ok(StatusCode::OK);
    }

    match outcome.status {
        PaymentStatus::Succeeded => {
            for product_id in outcome.snapshot.product_ids() {
                announce(&state, AvailabilityEvent::Sold { product_id }).await;
            }
            if let (Some(events), Some(order_id)) = (&state.events, report.order_id) {
                events
                    .publish_json(
                        TOPIC_ORDERS,
                        &order_id.to_string(),
                        &OrderConfirmedEvent {
                            order_id,
                            session_id: outcome.session_id.to_string(),
                            total_cents: outcome.snapshot.total_cents(),
                            line_count: outcome.snapshot.items.len(),
                            timestamp: Utc::now().timestamp(),
                        },
                    )
                    .await;
            }
        }
        PaymentStatus::Failed | PaymentStatus::Canceled => {
            for product_id in outcome.snapshot.product_ids() {
                announce(&state, AvailabilityEvent::Released { product_id }).await;
                if let Some(events) = &state.events {
                    events
                        .publish_json(
                            TOPIC_RESERVATIONS,
                            &product_id.to_string(),
                            &HoldReleasedEvent {
                                product_id,
                                session_id: outcome.session_id.to_string(),
                                cause: "payment_failed".to_string(),
                                timestamp: Utc::now().timestamp(),
                            },
                        )
                        .await;
                }
            }
        }
        _ => {}
    }

    Ok(StatusCode::OK)
}
