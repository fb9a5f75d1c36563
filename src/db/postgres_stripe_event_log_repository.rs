use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;

use crate::db::stripe_event_log_repository::StripeEventLogRepository;

pub struct PostgresStripeEventLogRepository {
    pub pool: PgPool,
}

#[async_trait]
impl StripeEventLogRepository for PostgresStripeEventLogRepository {
    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO stripe_event_log (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE stripe_event_log SET processed_at = $2 WHERE event_id = $1")
            .bind(event_id)
            .bind(processed_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
