use async_trait::async_trait;
use uuid::Uuid;

/// Thin persistence for the two business records whose creation drives
/// beta activation tracking. Full work-order/invoice CRUD lives elsewhere.
#[async_trait]
pub trait ShopRepository: Send + Sync {
    async fn insert_work_order(
        &self,
        tenant_id: Uuid,
        summary: &str,
    ) -> Result<Uuid, sqlx::Error>;

    async fn insert_invoice(&self, tenant_id: Uuid, total_cents: i64)
        -> Result<Uuid, sqlx::Error>;
}
