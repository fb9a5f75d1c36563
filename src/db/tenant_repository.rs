use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::models::tenant::{BetaCandidacy, Tenant, TenantBillingSnapshot};

/// Filter values a beta promotion update must re-assert. The update only
/// matches when every predicate still holds at write time, which is what
/// defends against two concurrent promotions of the same tenant.
#[derive(Debug, Clone, Copy)]
pub struct BetaPromotionGuard {
    pub candidate_since_after: OffsetDateTime,
    pub min_work_orders: i32,
    pub min_invoices: i32,
}

#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, sqlx::Error>;

    async fn billing_snapshot(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantBillingSnapshot>, sqlx::Error>;

    async fn find_tenant_id_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error>;

    async fn find_tenant_id_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error>;

    async fn set_stripe_customer_id(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error>;

    /// Activation supersedes trial and grace: one atomic update sets the
    /// status, refs and period end and clears both deadlines.
    async fn activate_billing(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
        customer_id: Option<&str>,
        current_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error>;

    /// Sets past_due and extends the grace deadline to `grace_candidate`
    /// only when that is later than the stored one. The deadline never
    /// moves backward across duplicate or reordered failure events.
    async fn mark_past_due(
        &self,
        tenant_id: Uuid,
        grace_candidate: OffsetDateTime,
    ) -> Result<(), sqlx::Error>;

    /// Cancels, snapshotting the provider's final period end and clearing
    /// the grace deadline. The subscription ref is retained for tracing.
    async fn cancel_billing(
        &self,
        tenant_id: Uuid,
        final_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error>;

    async fn set_billing_exempt(
        &self,
        tenant_id: Uuid,
        exempt: bool,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error>;

    async fn beta_candidacy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<BetaCandidacy>, sqlx::Error>;

    async fn increment_beta_work_orders(&self, tenant_id: Uuid) -> Result<(), sqlx::Error>;

    async fn increment_beta_invoices(&self, tenant_id: Uuid) -> Result<(), sqlx::Error>;

    /// Terminal expiry: clears the candidate flag without promoting.
    async fn expire_beta_candidacy(&self, tenant_id: Uuid) -> Result<(), sqlx::Error>;

    /// Guarded promotion update. Returns false when the filter matched no
    /// row (lost the race, already promoted, or no longer eligible).
    async fn promote_beta_candidate(
        &self,
        tenant_id: Uuid,
        guard: BetaPromotionGuard,
        promoted_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error>;

    async fn count_beta_testers(&self) -> Result<i64, sqlx::Error>;
}
