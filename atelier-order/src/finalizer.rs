use atelier_catalog::ProductRepository;
use atelier_core::notify::{Notifier, OrderConfirmation};
use atelier_core::payment::{PaymentOutcome, PaymentStatus};
use atelier_core::repository::ReservationRepository;
use atelier_core::StoreError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::Order;
use crate::repository::OrderRepository;

/// What one callback delivery did.
#[derive(Debug, Default)]
pub struct FinalizeReport {
    pub order_id: Option<Uuid>,
    pub reservations_released: usize,
    /// A redelivered callback that had already been handled.
    pub already_processed: bool,
    /// Best-effort sub-steps (sold flags, notification) that failed and were
    /// logged.
    pub degraded_steps: usize,
}

/// Consumes settled payment outcomes: holds become an order on success, or
/// return to the available pool on failure.
///
/// The processor may redeliver the same notification, so both paths must be
/// safe to repeat. On success the order row is the durable source of truth;
/// the payment is already captured, so every step after order creation is
/// best-effort: a failed product update or notification is logged and never
/// rolls the order back.
pub struct CheckoutFinalizer {
    reservations: Arc<dyn ReservationRepository>,
    products: Arc<dyn ProductRepository>,
    orders: Arc<dyn OrderRepository>,
    notifier: Arc<dyn Notifier>,
}

impl CheckoutFinalizer {
    pub fn new(
        reservations: Arc<dyn ReservationRepository>,
        products: Arc<dyn ProductRepository>,
        orders: Arc<dyn OrderRepository>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            reservations,
            products,
            orders,
            notifier,
        }
    }

    pub async fn handle_outcome(
        &self,
        outcome: &PaymentOutcome,
    ) -> Result<FinalizeReport, StoreError> {
        match outcome.status {
            PaymentStatus::Succeeded => self.finalize_success(outcome).await,
            PaymentStatus::Failed | PaymentStatus::Canceled => {
                self.finalize_failure(outcome).await
            }
            _ => {
                tracing::debug!(
                    intent_id = %outcome.intent_id,
                    status = ?outcome.status,
                    "Ignoring non-terminal payment status"
                );
                Ok(FinalizeReport::default())
            }
        }
    }

    async fn finalize_success(
        &self,
        outcome: &PaymentOutcome,
    ) -> Result<FinalizeReport, StoreError> {
        let mut report = FinalizeReport::default();

        if let Some(existing) = self
            .orders
            .find_by_payment_intent(&outcome.intent_id)
            .await?
        {
            tracing::info!(
                intent_id = %outcome.intent_id,
                order_id = %existing.id,
                "Payment success redelivered; order already exists"
            );
            report.order_id = Some(existing.id);
            report.already_processed = true;
            return Ok(report);
        }

        // 1. Order + lines from the metadata snapshot. The one step that may
        //    fail the callback: without the order row nothing downstream
        //    makes sense, and the processor will redeliver.
        let order = Order::from_snapshot(
            outcome.session_id.clone(),
            &outcome.intent_id,
            &outcome.snapshot,
            outcome.customer_email.clone(),
        );
        self.orders.create(&order).await?;
        report.order_id = Some(order.id);
        tracing::info!(
            order_id = %order.id,
            lines = order.lines.len(),
            total_cents = order.total_cents,
            "Order created from payment success"
        );

        // 2. Sold flags, per product. One failure must not block the others.
        for product_id in order.product_ids() {
            if let Err(e) = self.products.mark_sold(product_id).await {
                tracing::error!(
                    order_id = %order.id,
                    product_id = %product_id,
                    error = %e,
                    "Failed to mark product sold; order stands"
                );
                report.degraded_steps += 1;
            }
        }

        // 3. Consume the holds.
        if let Err(e) = self
            .reservations
            .complete(&outcome.session_id, &order.product_ids())
            .await
        {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Failed to complete reservations; sweep will expire the leftovers"
            );
            report.degraded_steps += 1;
        }

        // 4. Confirmation email.
        let confirmation = OrderConfirmation {
            order_id: order.id,
            email: order.customer_email.clone(),
            total_cents: order.total_cents,
            currency: order.currency.clone(),
            line_count: order.lines.len(),
        };
        if let Err(e) = self.notifier.order_confirmation(&confirmation).await {
            tracing::error!(
                order_id = %order.id,
                error = %e,
                "Order confirmation delivery failed"
            );
            report.degraded_steps += 1;
        }

        Ok(report)
    }

    async fn finalize_failure(
        &self,
        outcome: &PaymentOutcome,
    ) -> Result<FinalizeReport, StoreError> {
        let mut report = FinalizeReport::default();

        // Items return to the pool immediately rather than waiting for the
        // sweep. Release is idempotent, which makes redelivery a no-op.
        let active = self.reservations.list_active(&outcome.session_id).await?;
        if active.is_empty() {
            report.already_processed = true;
            return Ok(report);
        }

        for reservation in active {
            match self
                .reservations
                .release(&outcome.session_id, reservation.product_id)
                .await
            {
                Ok(true) => report.reservations_released += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(
                        product_id = %reservation.product_id,
                        error = %e,
                        "Failed to release hold after payment failure"
                    );
                    report.degraded_steps += 1;
                }
            }
        }

        tracing::info!(
            intent_id = %outcome.intent_id,
            released = report.reservations_released,
            "Payment failure processed; holds returned to the pool"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryOrders;
    use async_trait::async_trait;
    use atelier_catalog::{MemoryStore, Product};
    use atelier_core::notify::LogNotifier;
    use atelier_core::payment::{CartSnapshot, SnapshotItem};
    use atelier_core::session::SessionId;
    use chrono::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        orders: Arc<MemoryOrders>,
        finalizer: CheckoutFinalizer,
        session: SessionId,
        products: Vec<Product>,
    }

    async fn fixture(product_count: usize) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let orders = Arc::new(MemoryOrders::new());
        let session = SessionId::generate();

        let mut products = Vec::new();
        for i in 0..product_count {
            let product = Product::new(&format!("piece-{i}"), &format!("Piece {i}"), "Iris", 10_000);
            store.create(&product).await.unwrap();
            store
                .reserve(product.id, &session, Duration::minutes(15))
                .await
                .unwrap();
            products.push(product);
        }

        let finalizer = CheckoutFinalizer::new(
            store.clone(),
            store.clone(),
            orders.clone(),
            Arc::new(LogNotifier),
        );

        Fixture {
            store,
            orders,
            finalizer,
            session,
            products,
        }
    }

    fn success_outcome(fixture: &Fixture) -> PaymentOutcome {
        PaymentOutcome {
            intent_id: "pi_test_1".to_string(),
            session_id: fixture.session.clone(),
            status: PaymentStatus::Succeeded,
            snapshot: CartSnapshot {
                items: fixture
                    .products
                    .iter()
                    .map(|p| SnapshotItem {
                        product_id: p.id,
                        name: p.name.clone(),
                        price_cents: p.price_cents,
                    })
                    .collect(),
            },
            customer_email: None,
        }
    }

    #[tokio::test]
    async fn success_creates_one_order_and_consumes_both_holds() {
        let fx = fixture(2).await;
        let outcome = success_outcome(&fx);

        let report = fx.finalizer.handle_outcome(&outcome).await.unwrap();
        let order_id = report.order_id.unwrap();
        assert!(!report.already_processed);

        let order = fx.orders.get(order_id).await.unwrap().unwrap();
        assert_eq!(order.lines.len(), 2);
        assert_eq!(order.total_cents, 20_000);

        for product in &fx.products {
            let stored = fx.store.get(product.id).await.unwrap().unwrap();
            assert!(stored.sold);
        }
        assert!(fx.store.list_active(&fx.session).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn redelivered_success_is_a_no_op() {
        let fx = fixture(2).await;
        let outcome = success_outcome(&fx);

        let first = fx.finalizer.handle_outcome(&outcome).await.unwrap();
        let second = fx.finalizer.handle_outcome(&outcome).await.unwrap();

        assert!(second.already_processed);
        assert_eq!(first.order_id, second.order_id);
        assert_eq!(fx.orders.count(), 1);
    }

    #[tokio::test]
    async fn failure_releases_every_hold_back_to_the_pool() {
        let fx = fixture(2).await;
        let outcome = PaymentOutcome {
            status: PaymentStatus::Failed,
            ..success_outcome(&fx)
        };

        let report = fx.finalizer.handle_outcome(&outcome).await.unwrap();
        assert_eq!(report.reservations_released, 2);
        assert!(fx.store.list_active(&fx.session).await.unwrap().is_empty());

        // Another shopper can claim the pieces immediately.
        let rival = SessionId::generate();
        for product in &fx.products {
            fx.store
                .reserve(product.id, &rival, Duration::minutes(15))
                .await
                .unwrap();
        }

        // Redelivery finds nothing left to release.
        let redelivered = fx.finalizer.handle_outcome(&outcome).await.unwrap();
        assert!(redelivered.already_processed);
        assert_eq!(redelivered.reservations_released, 0);
    }

    /// Product repository that fails `mark_sold` for one id, standing in for
    /// a flaky backend mid-callback.
    struct FlakyProducts {
        inner: Arc<MemoryStore>,
        poison: Uuid,
    }

    #[async_trait]
    impl ProductRepository for FlakyProducts {
        async fn create(&self, product: &Product) -> Result<(), StoreError> {
            self.inner.create(product).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
            self.inner.get(id).await
        }

        async fn list(&self) -> Result<Vec<Product>, StoreError> {
            self.inner.list().await
        }

        async fn mark_sold(&self, id: Uuid) -> Result<(), StoreError> {
            if id == self.poison {
                return Err(StoreError::backend(std::io::Error::other("write timeout")));
            }
            self.inner.mark_sold(id).await
        }
    }

    #[tokio::test]
    async fn one_failed_sold_flag_does_not_block_the_order() {
        let fx = fixture(2).await;
        let flaky = Arc::new(FlakyProducts {
            inner: fx.store.clone(),
            poison: fx.products[0].id,
        });
        let finalizer = CheckoutFinalizer::new(
            fx.store.clone(),
            flaky,
            fx.orders.clone(),
            Arc::new(LogNotifier),
        );

        let report = finalizer
            .handle_outcome(&success_outcome(&fx))
            .await
            .unwrap();

        assert!(report.order_id.is_some());
        assert_eq!(report.degraded_steps, 1);
        assert_eq!(fx.orders.count(), 1);
        // The other product still got its sold flag.
        let other = fx.store.get(fx.products[1].id).await.unwrap().unwrap();
        assert!(other.sold);
    }
}
