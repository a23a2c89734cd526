use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Typed reservation-store errors. Returned to callers as values; nothing in
/// the store panics past its boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Another live session holds the product. Surfaced to the shopper as
    /// "this item was just taken".
    #[error("Product {product_id} is held by another shopper until {until}")]
    AlreadyHeld {
        product_id: Uuid,
        until: DateTime<Utc>,
    },

    #[error("Product not found: {0}")]
    ProductNotFound(Uuid),

    #[error("Product {0} has already been sold")]
    Sold(Uuid),

    #[error("Storage backend failure: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}
