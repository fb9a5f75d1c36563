use async_trait::async_trait;
use time::OffsetDateTime;

/// Idempotency ledger keyed by the provider-issued event id. The unique
/// insert is the synchronization point between concurrent duplicate
/// deliveries: exactly one caller observes `true` from `record_event`.
#[async_trait]
pub trait StripeEventLogRepository: Send + Sync {
    /// Returns true when this call inserted the row, false when the event
    /// id was already present (duplicate delivery).
    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool, sqlx::Error>;

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;
}
