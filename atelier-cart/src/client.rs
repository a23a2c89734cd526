use async_trait::async_trait;
use atelier_core::repository::ReservationRepository;
use atelier_core::reservation::Reservation;
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::Duration;
use std::sync::Arc;
use uuid::Uuid;

/// The reservation-store surface the cart talks through. Mirrors the public
/// API contract: structured results, never a panic across the boundary.
#[async_trait]
pub trait ReservationApi: Send + Sync {
    async fn reserve(
        &self,
        session_id: &SessionId,
        product_id: Uuid,
    ) -> Result<Reservation, StoreError>;

    async fn release(&self, session_id: &SessionId, product_id: Uuid)
        -> Result<bool, StoreError>;

    async fn list_active(&self, session_id: &SessionId) -> Result<Vec<Reservation>, StoreError>;
}

/// In-process client over a repository, used by server-rendered pages and
/// the test suites. The hold duration is fixed per deployment.
pub struct DirectReservationApi {
    repo: Arc<dyn ReservationRepository>,
    hold: Duration,
}

impl DirectReservationApi {
    pub fn new(repo: Arc<dyn ReservationRepository>, hold: Duration) -> Self {
        Self { repo, hold }
    }
}

#[async_trait]
impl ReservationApi for DirectReservationApi {
    async fn reserve(
        &self,
        session_id: &SessionId,
        product_id: Uuid,
    ) -> Result<Reservation, StoreError> {
        self.repo.reserve(product_id, session_id, self.hold).await
    }

    async fn release(
        &self,
        session_id: &SessionId,
        product_id: Uuid,
    ) -> Result<bool, StoreError> {
        self.repo.release(session_id, product_id).await
    }

    async fn list_active(&self, session_id: &SessionId) -> Result<Vec<Reservation>, StoreError> {
        self.repo.list_active(session_id).await
    }
}
