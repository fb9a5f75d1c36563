use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::shop_repository::ShopRepository;

pub struct PostgresShopRepository {
    pub pool: PgPool,
}

#[async_trait]
impl ShopRepository for PostgresShopRepository {
    async fn insert_work_order(
        &self,
        tenant_id: Uuid,
        summary: &str,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO work_orders (tenant_id, summary)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(summary)
        .fetch_one(&self.pool)
        .await
    }

    async fn insert_invoice(
        &self,
        tenant_id: Uuid,
        total_cents: i64,
    ) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO invoices (tenant_id, total_cents)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(tenant_id)
        .bind(total_cents)
        .fetch_one(&self.pool)
        .await
    }
}
