use axum::{extract::State, Json};
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use atelier_core::reservation::SweepSummary;
use atelier_shared::models::events::{AvailabilityEvent, SweepCompletedEvent};
use atelier_store::events::TOPIC_RESERVATIONS;

use crate::error::AppError;
use crate::products::announce;
use crate::state::AppState;

/// Server-side expiry enforcement, independent of any connected client: a
/// hold lapses even if the browser tab is long gone. Its own cancellable
/// task, so a countdown or reconciler failure in some session can never
/// disable it.
pub fn spawn_sweep(
    state: AppState,
    interval: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(interval_secs = interval.as_secs(), "Expiry sweep started");
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Expiry sweep stopped");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = sweep_once(&state).await {
                        error!(error = %e, "Sweep run failed; next interval retries");
                    }
                }
            }
        }
    })
}

/// One sweep pass. Also invoked by the hosting platform through
/// `POST /v1/internal/sweep`; both paths are idempotent.
pub async fn sweep_once(state: &AppState) -> Result<SweepSummary, AppError> {
    let summary = state.reservations.sweep_expired(Utc::now()).await?;

    if summary.reservations_expired > 0 || summary.errors > 0 {
        info!(
            expired = summary.reservations_expired,
            released = summary.products_released,
            errors = summary.errors,
            "Sweep pass finished"
        );
    }

    for product_id in &summary.released_products {
        announce(
            state,
            AvailabilityEvent::Released {
                product_id: *product_id,
            },
        )
        .await;
    }
    if let Some(events) = &state.events {
        if summary.reservations_expired > 0 {
            events
                .publish_json(
                    TOPIC_RESERVATIONS,
                    "sweep",
                    &SweepCompletedEvent {
                        reservations_expired: summary.reservations_expired,
                        products_released: summary.products_released,
                        errors: summary.errors,
                        timestamp: Utc::now().timestamp(),
                    },
                )
                .await;
        }
    }

    Ok(summary)
}

/// POST /v1/internal/sweep
pub async fn trigger_sweep(State(state): State<AppState>) -> Result<Json<SweepSummary>, AppError> {
    let summary = sweep_once(&state).await?;
    Ok(Json(summary))
}
