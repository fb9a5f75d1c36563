use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::beta_slot_repository::BetaSlotRepository;

pub struct PostgresBetaSlotRepository {
    pub pool: PgPool,
}

#[async_trait]
impl BetaSlotRepository for PostgresBetaSlotRepository {
    async fn is_initialized(&self) -> Result<bool, sqlx::Error> {
        let exists =
            sqlx::query_scalar::<_, i64>("SELECT claimed FROM beta_slots WHERE id = TRUE")
                .fetch_optional(&self.pool)
                .await?
                .is_some();

        Ok(exists)
    }

    async fn initialize(&self, claimed: i64) -> Result<(), sqlx::Error> {
        // Two instances bootstrapping at once race on the primary key; the
        // loser's insert is a no-op.
        sqlx::query(
            r#"
            INSERT INTO beta_slots (id, claimed)
            VALUES (TRUE, $1)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(claimed)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_claim(&self, cap: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE beta_slots SET claimed = claimed + 1 WHERE id = TRUE AND claimed < $1",
        )
        .bind(cap)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE beta_slots SET claimed = claimed - 1 WHERE id = TRUE AND claimed > 0",
        )
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
