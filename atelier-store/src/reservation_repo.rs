use async_trait::async_trait;
use atelier_core::repository::ReservationRepository;
use atelier_core::reservation::{Reservation, ReservationStatus, SweepSummary};
use atelier_core::session::SessionId;
use atelier_core::StoreError;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

/// Postgres-backed reservation store.
///
/// Every mutation of the product's `reserved_until`/`reserved_by_session`
/// pair goes through a conditional UPDATE, never an unconditional write, so
/// concurrent reserves, releases and sweep runs, possibly from separate
/// processes, resolve without lost updates.
pub struct PgReservationRepository {
    pool: PgPool,
}

impl PgReservationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    product_id: Uuid,
    session_id: String,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
}

impl ReservationRow {
    fn into_reservation(self) -> Result<Reservation, StoreError> {
        let status = ReservationStatus::parse(&self.status).ok_or_else(|| {
            StoreError::Backend(format!("unknown reservation status: {}", self.status).into())
        })?;
        Ok(Reservation {
            id: self.id,
            product_id: self.product_id,
            session_id: SessionId::from(self.session_id),
            created_at: self.created_at,
            expires_at: self.expires_at,
            status,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AvailabilityProbe {
    sold: bool,
    reserved_until: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct LapsedRow {
    id: Uuid,
    product_id: Uuid,
    session_id: String,
}

#[async_trait]
impl ReservationRepository for PgReservationRepository {
    async fn reserve(
        &self,
        product_id: Uuid,
        session_id: &SessionId,
        hold: Duration,
    ) -> Result<Reservation, StoreError> {
        let now = Utc::now();
        let expires_at = now + hold;
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        // The claim: one conditional UPDATE. A past reserved_until counts as
        // available even before the sweep has cleared it; the session
        // already holding the product may pass through to extend.
        let claimed = sqlx::query(
            r#"
            UPDATE products
            SET reserved_until = $1, reserved_by_session = $2
            WHERE id = $3
              AND sold = FALSE
              AND (reserved_by_session IS NULL
                   OR reserved_until <= $4
                   OR reserved_by_session = $2)
            "#,
        )
        .bind(expires_at)
        .bind(session_id.as_str())
        .bind(product_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if claimed.rows_affected() == 0 {
            let probe = sqlx::query_as::<_, AvailabilityProbe>(
                "SELECT sold, reserved_until FROM products WHERE id = $1",
            )
            .bind(product_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
            let _ = tx.rollback().await;

            return Err(match probe {
                None => StoreError::ProductNotFound(product_id),
                Some(p) if p.sold => StoreError::Sold(product_id),
                Some(p) => StoreError::AlreadyHeld {
                    product_id,
                    until: p.reserved_until.unwrap_or(now),
                },
            });
        }

        // Extend the session's still-valid reservation row in place, or
        // start a fresh one. Terminal rows are never revived.
        let extended = sqlx::query_as::<_, ReservationRow>(
            r#"
            UPDATE reservations
            SET expires_at = $1
            WHERE product_id = $2 AND session_id = $3 AND status = 'active' AND expires_at > $4
            RETURNING id, product_id, session_id, created_at, expires_at, status
            "#,
        )
        .bind(expires_at)
        .bind(product_id)
        .bind(session_id.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        let row = match extended {
            Some(row) => row,
            None => sqlx::query_as::<_, ReservationRow>(
                r#"
                INSERT INTO reservations (id, product_id, session_id, created_at, expires_at, status)
                VALUES ($1, $2, $3, $4, $5, 'active')
                RETURNING id, product_id, session_id, created_at, expires_at, status
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(product_id)
            .bind(session_id.as_str())
            .bind(now)
            .bind(expires_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::backend)?,
        };

        tx.commit().await.map_err(StoreError::backend)?;
        row.into_reservation()
    }

    async fn list_active(&self, session_id: &SessionId) -> Result<Vec<Reservation>, StoreError> {
        // Lapsed rows are filtered here, not just by the sweep: a
        // truly-expired reservation is never reachable through this read.
        let rows = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, product_id, session_id, created_at, expires_at, status
            FROM reservations
            WHERE session_id = $1 AND status = 'active' AND expires_at > $2
            ORDER BY created_at
            "#,
        )
        .bind(session_id.as_str())
        .bind(Utc::now())
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        rows.into_iter().map(|r| r.into_reservation()).collect()
    }

    async fn release(&self, session_id: &SessionId, product_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        let expired = sqlx::query(
            r#"
            UPDATE reservations
            SET status = 'expired'
            WHERE session_id = $1 AND product_id = $2 AND status = 'active'
            "#,
        )
        .bind(session_id.as_str())
        .bind(product_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        // Only clear the availability fields if they still point at this
        // session; a newer hold must survive a stale release.
        sqlx::query(
            r#"
            UPDATE products
            SET reserved_until = NULL, reserved_by_session = NULL
            WHERE id = $1 AND reserved_by_session = $2
            "#,
        )
        .bind(product_id)
        .bind(session_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(expired.rows_affected() > 0)
    }

    async fn complete(
        &self,
        session_id: &SessionId,
        product_ids: &[Uuid],
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(StoreError::backend)?;

        for &product_id in product_ids {
            sqlx::query(
                r#"
                UPDATE reservations
                SET status = 'completed'
                WHERE session_id = $1 AND product_id = $2 AND status = 'active'
                "#,
            )
            .bind(session_id.as_str())
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;

            // Sold is forever; the reserved pair is cleared only when it
            // still points at the buying session.
            sqlx::query("UPDATE products SET sold = TRUE WHERE id = $1")
                .bind(product_id)
                .execute(&mut *tx)
                .await
                .map_err(StoreError::backend)?;

            sqlx::query(
                r#"
                UPDATE products
                SET reserved_until = NULL, reserved_by_session = NULL
                WHERE id = $1 AND reserved_by_session = $2
                "#,
            )
            .bind(product_id)
            .bind(session_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::backend)?;
        }

        tx.commit().await.map_err(StoreError::backend)?;
        Ok(())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<SweepSummary, StoreError> {
        let lapsed = sqlx::query_as::<_, LapsedRow>(
            r#"
            SELECT id, product_id, session_id
            FROM reservations
            WHERE status = 'active' AND expires_at <= $1
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        let mut summary = SweepSummary::default();

        // No batch transaction: each item stands alone so one failure does
        // not block releasing the rest.
        for row in lapsed {
            let expired = match sqlx::query(
                r#"
                UPDATE reservations
                SET status = 'expired'
                WHERE id = $1 AND status = 'active' AND expires_at <= $2
                "#,
            )
            .bind(row.id)
            .bind(now)
            .execute(&self.pool)
            .await
            {
                Ok(res) => res.rows_affected() > 0,
                Err(e) => {
                    error!(reservation_id = %row.id, error = %e, "Sweep failed to expire reservation");
                    summary.errors += 1;
                    continue;
                }
            };
            if expired {
                summary.reservations_expired += 1;
            }

            // Guarded clear: a hold created after this one lapsed, or this
            // session's own extension, is left untouched.
            match sqlx::query(
                r#"
                UPDATE products
                SET reserved_until = NULL, reserved_by_session = NULL
                WHERE id = $1 AND reserved_by_session = $2 AND reserved_until <= $3
                "#,
            )
            .bind(row.product_id)
            .bind(&row.session_id)
            .bind(now)
            .execute(&self.pool)
            .await
            {
                Ok(res) if res.rows_affected() > 0 => {
                    summary.products_released += 1;
                    summary.released_products.push(row.product_id);
                }
                Ok(_) => {}
                Err(e) => {
                    error!(product_id = %row.product_id, error = %e, "Sweep failed to clear product hold");
                    summary.errors += 1;
                }
            }
        }

        Ok(summary)
    }
}
