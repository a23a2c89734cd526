use atelier_core::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized(String),
    NotFound(String),
    /// Contention: another live session holds the item.
    Conflict {
        message: String,
        held_until: Option<DateTime<Utc>>,
    },
    /// The item is permanently unavailable.
    Gone(String),
    Internal(anyhow::Error),
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "{msg}"),
            AppError::Unauthorized(msg) => write!(f, "{msg}"),
            AppError::NotFound(msg) => write!(f, "{msg}"),
            AppError::Conflict { message, .. } => write!(f, "{message}"),
            AppError::Gone(msg) => write!(f, "{msg}"),
            AppError::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AlreadyHeld { until, .. } => AppError::Conflict {
                message: "This item was just taken by another shopper".to_string(),
                held_until: Some(until),
            },
            StoreError::ProductNotFound(id) => AppError::NotFound(format!("Product {id} not found")),
            StoreError::Sold(id) => AppError::Gone(format!("Product {id} has been sold")),
            StoreError::Backend(e) => AppError::Internal(anyhow::anyhow!(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, json!({ "error": msg })),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "error": msg })),
            AppError::Conflict {
                message,
                held_until,
            } => (
                StatusCode::CONFLICT,
                json!({ "error": message, "held_until": held_until }),
            ),
            AppError::Gone(msg) => (StatusCode::GONE, json!({ "error": msg })),
            AppError::Internal(err) => {
                tracing::error!("Internal Server Error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
