use async_trait::async_trait;
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A one-of-a-kind handmade listing. Stock is one unit: the availability
/// view fields (`reserved_until`/`reserved_by_session`) are denormalized
/// onto the product so readers never need a join to answer "can I add this
/// to my cart".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub maker: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub currency: String,
    /// Permanently unavailable once true; sold items never return to the
    /// pool.
    pub sold: bool,
    /// Mirror of the active reservation's `expires_at`, or None if unheld.
    pub reserved_until: Option<DateTime<Utc>>,
    /// Session currently holding the product; set and cleared atomically
    /// with `reserved_until`.
    pub reserved_by_session: Option<SessionId>,
    pub created_at: DateTime<Utc>,
}

impl Product {
    pub fn new(slug: &str, name: &str, maker: &str, price_cents: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            maker: maker.to_string(),
            description: None,
            price_cents,
            currency: "USD".to_string(),
            sold: false,
            reserved_until: None,
            reserved_by_session: None,
            created_at: Utc::now(),
        }
    }

    /// A product with a past `reserved_until` is "stale-held": the hold has
    /// lapsed but the sweep has not cleared the fields yet. Every reader
    /// must treat it as available.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.sold && self.reserved_until.map_or(true, |until| until <= now)
    }

    /// Whether `session_id` validly holds this product right now.
    pub fn held_by(&self, session_id: &SessionId, now: DateTime<Utc>) -> bool {
        !self.sold
            && self.reserved_by_session.as_ref() == Some(session_id)
            && self.reserved_until.is_some_and(|until| until > now)
    }

    pub fn availability(&self, now: DateTime<Utc>) -> Availability {
        if self.sold {
            Availability::Sold
        } else if let Some(until) = self.reserved_until.filter(|until| *until > now) {
            Availability::Held { until }
        } else {
            Availability::Available
        }
    }
}

/// Read-model answer for product pages.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Available,
    Held { until: DateTime<Utc> },
    Sold,
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn create(&self, product: &Product) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError>;

    async fn list(&self) -> Result<Vec<Product>, StoreError>;

    /// Permanently mark the product sold. Idempotent.
    async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn stale_held_product_reads_as_available() {
        let now = Utc::now();
        let mut product = Product::new("walnut-bowl", "Walnut Bowl", "Ada", 8_500);
        product.reserved_until = Some(now - Duration::seconds(30));
        product.reserved_by_session = Some(SessionId::generate());

        assert!(product.is_available(now));
        assert_eq!(product.availability(now), Availability::Available);
    }

    #[test]
    fn validly_held_product_is_unavailable_to_others() {
        let now = Utc::now();
        let holder = SessionId::generate();
        let mut product = Product::new("linen-throw", "Linen Throw", "Maya", 12_000);
        let until = now + Duration::minutes(10);
        product.reserved_until = Some(until);
        product.reserved_by_session = Some(holder.clone());

        assert!(!product.is_available(now));
        assert!(product.held_by(&holder, now));
        assert!(!product.held_by(&SessionId::generate(), now));
        assert_eq!(product.availability(now), Availability::Held { until });
    }

    #[test]
    fn sold_product_never_returns_to_the_pool() {
        let now = Utc::now();
        let mut product = Product::new("raku-vase", "Raku Vase", "Kenji", 21_000);
        product.sold = true;

        assert!(!product.is_available(now));
        assert_eq!(product.availability(now), Availability::Sold);
    }
}
