use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::tenant_repository::{BetaPromotionGuard, TenantRepository};
use crate::models::tenant::{BetaCandidacy, Tenant, TenantBillingSnapshot};

pub struct PostgresTenantRepository {
    pub pool: PgPool,
}

#[async_trait]
impl TenantRepository for PostgresTenantRepository {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
        sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, billing_status, current_period_end, grace_ends_at,
                   trial_ends_at, billing_exempt, billing_exempt_reason,
                   stripe_customer_id, stripe_subscription_id, is_beta_tester,
                   created_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn billing_snapshot(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantBillingSnapshot>, sqlx::Error> {
        sqlx::query_as::<_, TenantBillingSnapshot>(
            r#"
            SELECT billing_exempt, billing_status, current_period_end,
                   grace_ends_at, trial_ends_at
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_tenant_id_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM tenants WHERE stripe_subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_tenant_id_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM tenants WHERE stripe_customer_id = $1")
            .bind(customer_id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn set_stripe_customer_id(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tenants SET stripe_customer_id = $2 WHERE id = $1")
            .bind(tenant_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn activate_billing(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
        customer_id: Option<&str>,
        current_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET billing_status = 'active',
                stripe_subscription_id = $2,
                stripe_customer_id = COALESCE($3, stripe_customer_id),
                current_period_end = $4,
                trial_ends_at = NULL,
                grace_ends_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(subscription_id)
        .bind(customer_id)
        .bind(current_period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_past_due(
        &self,
        tenant_id: Uuid,
        grace_candidate: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        // GREATEST keeps an already-later deadline; out-of-order duplicate
        // failure events can only extend the grace clock.
        sqlx::query(
            r#"
            UPDATE tenants
            SET billing_status = 'past_due',
                grace_ends_at = GREATEST(COALESCE(grace_ends_at, $2), $2)
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(grace_candidate)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn cancel_billing(
        &self,
        tenant_id: Uuid,
        final_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE tenants
            SET billing_status = 'canceled',
                current_period_end = $2,
                grace_ends_at = NULL
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(final_period_end)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn set_billing_exempt(
        &self,
        tenant_id: Uuid,
        exempt: bool,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET billing_exempt = $2,
                billing_exempt_reason = $3
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .bind(exempt)
        .bind(reason)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn beta_candidacy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<BetaCandidacy>, sqlx::Error> {
        sqlx::query_as::<_, BetaCandidacy>(
            r#"
            SELECT beta_candidate, beta_candidate_since,
                   beta_work_orders_created, beta_invoices_created,
                   is_beta_tester
            FROM tenants
            WHERE id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn increment_beta_work_orders(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tenants SET beta_work_orders_created = beta_work_orders_created + 1 WHERE id = $1",
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_beta_invoices(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE tenants SET beta_invoices_created = beta_invoices_created + 1 WHERE id = $1",
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn expire_beta_candidacy(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE tenants SET beta_candidate = FALSE WHERE id = $1")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn promote_beta_candidate(
        &self,
        tenant_id: Uuid,
        guard: BetaPromotionGuard,
        promoted_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        // Eligibility is re-asserted in the filter; a concurrent promotion
        // or expiry between read and write makes this match zero rows.
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET is_beta_tester = TRUE,
                beta_candidate = FALSE,
                beta_activated_at = $2
            WHERE id = $1
              AND beta_candidate = TRUE
              AND is_beta_tester = FALSE
              AND beta_candidate_since IS NOT NULL
              AND beta_candidate_since >= $3
              AND beta_work_orders_created >= $4
              AND beta_invoices_created >= $5
            "#,
        )
        .bind(tenant_id)
        .bind(promoted_at)
        .bind(guard.candidate_since_after)
        .bind(guard.min_work_orders)
        .bind(guard.min_invoices)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_beta_testers(&self) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM tenants WHERE is_beta_tester = TRUE",
        )
        .fetch_one(&self.pool)
        .await
    }
}
