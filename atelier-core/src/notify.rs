use async_trait::async_trait;
use atelier_shared::pii::Masked;
use uuid::Uuid;

/// Payload handed to the transactional-email collaborator after checkout.
#[derive(Debug, Clone)]
pub struct OrderConfirmation {
    pub order_id: Uuid,
    pub email: Option<Masked<String>>,
    pub total_cents: i64,
    pub currency: String,
    pub line_count: usize,
}

/// Outbound notification port. Fire-and-forget from the caller's
/// perspective: delivery failures are logged, never surfaced to the shopper
/// mid-checkout.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Default notifier: records the send in the log stream. Stands in for the
/// real email collaborator in development and tests.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(
            order_id = %confirmation.order_id,
            lines = confirmation.line_count,
            total_cents = confirmation.total_cents,
            "Order confirmation queued for delivery"
        );
        Ok(())
    }
}
