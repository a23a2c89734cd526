use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::reservation::{Reservation, SweepSummary};
use crate::session::SessionId;

/// Authoritative reservation store.
///
/// The product's `reserved_until`/`reserved_by_session` pair is the single
/// shared mutable resource; implementations must mutate it only through
/// conditional (compare-and-set style) paths so that concurrent callers
/// (shoppers, the sweep, the checkout finalizer) resolve races safely. An
/// in-process mutex is not a substitute: the actors may run in separate
/// processes.
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    /// Atomically claim `product_id` for `session_id` for the given hold
    /// duration.
    ///
    /// Fails with [`StoreError::AlreadyHeld`] when a *different* session
    /// validly holds the product. A call from the session already holding it
    /// extends the existing hold instead of erroring. A past
    /// `reserved_until` counts as available even before any sweep has
    /// cleared it.
    async fn reserve(
        &self,
        product_id: Uuid,
        session_id: &SessionId,
        hold: Duration,
    ) -> Result<Reservation, StoreError>;

    /// All reservations still holding inventory for this session. Rows whose
    /// `expires_at` has passed are filtered out whether or not the sweep has
    /// run.
    async fn list_active(&self, session_id: &SessionId) -> Result<Vec<Reservation>, StoreError>;

    /// Release the session's hold on a product. Idempotent: returns `false`
    /// when there was nothing to release. The product's availability fields
    /// are cleared only if they still point at this session.
    async fn release(&self, session_id: &SessionId, product_id: Uuid) -> Result<bool, StoreError>;

    /// Consume the session's reservations for `product_ids` into a sale:
    /// reservations become `completed` and the products are permanently
    /// marked sold. Idempotent.
    async fn complete(
        &self,
        session_id: &SessionId,
        product_ids: &[Uuid],
    ) -> Result<(), StoreError>;

    /// Force-expire every reservation whose `expires_at` is at or before
    /// `now`, clearing each product's availability fields only when they
    /// still point at the lapsed session. Individual item failures are
    /// counted and logged, never fatal to the batch. Safe to run
    /// concurrently with itself and with `reserve`/`release`.
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError>;
}
