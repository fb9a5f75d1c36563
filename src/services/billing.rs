use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::tenant_repository::TenantRepository;
use crate::services::stripe::{StripeService, StripeServiceError, SubscriptionInfo};
use crate::utils::access::GRACE_WINDOW_DAYS;

/// Metadata key stamped onto subscriptions at checkout initiation; the
/// resolver treats it as the authoritative tenant link.
pub const TENANT_METADATA_KEY: &str = "tenant_id";

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("provider lookup failed: {0}")]
    Provider(#[from] StripeServiceError),
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Every transition either lands on a tenant or resolves to nobody.
/// Unresolved is a soft outcome: the caller logs and acknowledges, since
/// it is usually stale test data on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    Applied(Uuid),
    Unresolved,
}

/// Map an opaque subscription/customer identity to a tenant. Precedence,
/// first match wins: checkout metadata, stored subscription ref, stored
/// customer ref. The customer linkage is the most durable fallback since
/// a provider customer survives subscription churn.
pub async fn resolve_tenant(
    tenants: &dyn TenantRepository,
    subscription_id: Option<&str>,
    customer_id: Option<&str>,
    metadata_tenant_id: Option<&str>,
) -> Result<Option<Uuid>, sqlx::Error> {
    if let Some(raw) = metadata_tenant_id {
        if let Ok(tenant_id) = Uuid::parse_str(raw) {
            if tenants.find_tenant_by_id(tenant_id).await?.is_some() {
                return Ok(Some(tenant_id));
            }
            warn!(%tenant_id, "subscription metadata names an unknown tenant");
        }
    }

    if let Some(subscription_id) = subscription_id {
        if let Some(tenant_id) = tenants
            .find_tenant_id_by_subscription_id(subscription_id)
            .await?
        {
            return Ok(Some(tenant_id));
        }
    }

    if let Some(customer_id) = customer_id {
        if let Some(tenant_id) = tenants.find_tenant_id_by_customer_id(customer_id).await? {
            return Ok(Some(tenant_id));
        }
    }

    Ok(None)
}

/// Fetch the subscription from the provider, folding NotFound into None.
/// Any other provider failure is transient and must bubble up so the
/// delivery is retried.
async fn lookup_subscription(
    stripe: &dyn StripeService,
    subscription_id: &str,
) -> Result<Option<SubscriptionInfo>, TransitionError> {
    match stripe.retrieve_subscription(subscription_id).await {
        Ok(info) => Ok(Some(info)),
        Err(StripeServiceError::NotFound(_)) => Ok(None),
        Err(err) => Err(TransitionError::Provider(err)),
    }
}

fn unix_to_offset(ts: i64) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(ts).ok()
}

/// Activate: the provider's subscription state is authoritative. Fetches
/// the current period end rather than trusting the event payload, then
/// applies one atomic update that supersedes any trial or grace state.
pub async fn activate(
    tenants: &dyn TenantRepository,
    stripe: &dyn StripeService,
    subscription_id: &str,
    customer_id: Option<&str>,
    metadata_tenant_id: Option<&str>,
) -> Result<TransitionOutcome, TransitionError> {
    let Some(info) = lookup_subscription(stripe, subscription_id).await? else {
        warn!(subscription_id, "activation for subscription unknown to provider");
        return Ok(TransitionOutcome::Unresolved);
    };

    let metadata_tenant = metadata_tenant_id
        .map(|s| s.to_string())
        .or_else(|| info.metadata.get(TENANT_METADATA_KEY).cloned());
    let customer = customer_id
        .map(|s| s.to_string())
        .or_else(|| info.customer.clone());

    let resolved = resolve_tenant(
        tenants,
        Some(subscription_id),
        customer.as_deref(),
        metadata_tenant.as_deref(),
    )
    .await?;

    let Some(tenant_id) = resolved else {
        warn!(subscription_id, "activation could not be matched to a tenant");
        return Ok(TransitionOutcome::Unresolved);
    };

    tenants
        .activate_billing(
            tenant_id,
            subscription_id,
            customer.as_deref(),
            unix_to_offset(info.current_period_end),
        )
        .await?;

    info!(%tenant_id, subscription_id, "billing activated");
    Ok(TransitionOutcome::Applied(tenant_id))
}

/// MarkPastDue: sets past_due and proposes `now + grace window` as the
/// grace deadline. The repository only ever extends an existing deadline,
/// so duplicate or reordered failure events cannot shorten it.
pub async fn mark_past_due(
    tenants: &dyn TenantRepository,
    stripe: &dyn StripeService,
    subscription_id: Option<&str>,
    customer_id: Option<&str>,
    now: OffsetDateTime,
) -> Result<TransitionOutcome, TransitionError> {
    let mut metadata_tenant: Option<String> = None;
    let mut customer = customer_id.map(|s| s.to_string());

    if let Some(subscription_id) = subscription_id {
        if let Some(info) = lookup_subscription(stripe, subscription_id).await? {
            metadata_tenant = info.metadata.get(TENANT_METADATA_KEY).cloned();
            if customer.is_none() {
                customer = info.customer;
            }
        }
    }

    let resolved = resolve_tenant(
        tenants,
        subscription_id,
        customer.as_deref(),
        metadata_tenant.as_deref(),
    )
    .await?;

    let Some(tenant_id) = resolved else {
        warn!(?subscription_id, "payment failure could not be matched to a tenant");
        return Ok(TransitionOutcome::Unresolved);
    };

    tenants
        .mark_past_due(tenant_id, now + Duration::days(GRACE_WINDOW_DAYS))
        .await?;

    warn!(%tenant_id, "billing marked past_due; grace window running");
    Ok(TransitionOutcome::Applied(tenant_id))
}

/// Cancel: terminal overwrite. Snapshots the provider's final period end
/// from the deleted-subscription payload for audit and clears the grace
/// deadline; the subscription ref is retained for traceability.
pub async fn cancel(
    tenants: &dyn TenantRepository,
    subscription_id: &str,
    customer_id: Option<&str>,
    metadata_tenant_id: Option<&str>,
    final_period_end: Option<OffsetDateTime>,
) -> Result<TransitionOutcome, TransitionError> {
    let resolved = resolve_tenant(tenants, Some(subscription_id), customer_id, metadata_tenant_id)
        .await?;

    let Some(tenant_id) = resolved else {
        warn!(subscription_id, "cancellation could not be matched to a tenant");
        return Ok(TransitionOutcome::Unresolved);
    };

    tenants.cancel_billing(tenant_id, final_period_end).await?;

    info!(%tenant_id, subscription_id, "billing canceled");
    Ok(TransitionOutcome::Applied(tenant_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::{MockTenantRepo, TenantRecord};
    use crate::models::tenant::BillingStatus;
    use crate::services::stripe::MockStripeService;
    use std::collections::HashMap;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn stripe_with_sub(
        subscription_id: &str,
        customer: Option<&str>,
        metadata_tenant: Option<Uuid>,
        period_end: i64,
    ) -> MockStripeService {
        let mut metadata = HashMap::new();
        if let Some(tenant_id) = metadata_tenant {
            metadata.insert(TENANT_METADATA_KEY.to_string(), tenant_id.to_string());
        }
        MockStripeService::new().with_subscription(SubscriptionInfo {
            id: subscription_id.to_string(),
            status: "active".into(),
            customer: customer.map(|s| s.to_string()),
            current_period_end: period_end,
            cancel_at_period_end: false,
            metadata,
        })
    }

    #[tokio::test]
    async fn resolver_prefers_metadata_over_stored_refs() {
        let by_metadata = Uuid::new_v4();
        let by_sub_ref = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        repo.insert(TenantRecord::new(by_metadata));
        let mut other = TenantRecord::new(by_sub_ref);
        other.stripe_subscription_id = Some("sub_1".into());
        repo.insert(other);

        let resolved = resolve_tenant(
            &repo,
            Some("sub_1"),
            None,
            Some(by_metadata.to_string().as_str()),
        )
        .await
        .unwrap();
        assert_eq!(resolved, Some(by_metadata));
    }

    #[tokio::test]
    async fn resolver_falls_back_to_subscription_then_customer_ref() {
        let by_sub_ref = Uuid::new_v4();
        let by_cust_ref = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut a = TenantRecord::new(by_sub_ref);
        a.stripe_subscription_id = Some("sub_1".into());
        repo.insert(a);
        let mut b = TenantRecord::new(by_cust_ref);
        b.stripe_customer_id = Some("cus_1".into());
        repo.insert(b);

        let resolved = resolve_tenant(&repo, Some("sub_1"), Some("cus_1"), None)
            .await
            .unwrap();
        assert_eq!(resolved, Some(by_sub_ref));

        let resolved = resolve_tenant(&repo, Some("sub_other"), Some("cus_1"), None)
            .await
            .unwrap();
        assert_eq!(resolved, Some(by_cust_ref));
    }

    #[tokio::test]
    async fn resolver_with_unknown_metadata_tenant_still_falls_back() {
        let by_cust_ref = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut a = TenantRecord::new(by_cust_ref);
        a.stripe_customer_id = Some("cus_1".into());
        repo.insert(a);

        let resolved = resolve_tenant(
            &repo,
            None,
            Some("cus_1"),
            Some(Uuid::new_v4().to_string().as_str()),
        )
        .await
        .unwrap();
        assert_eq!(resolved, Some(by_cust_ref));
    }

    #[tokio::test]
    async fn resolver_returns_none_when_nothing_matches() {
        let repo = MockTenantRepo::default();
        let resolved = resolve_tenant(&repo, Some("sub_x"), Some("cus_x"), None)
            .await
            .unwrap();
        assert_eq!(resolved, None);
    }

    #[tokio::test]
    async fn activate_sets_period_and_clears_trial_and_grace() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut record = TenantRecord::new(tenant_id);
        record.trial_ends_at = Some(now() + Duration::days(3));
        record.grace_ends_at = Some(now() + Duration::days(2));
        repo.insert(record);

        let period_end = 1_705_000_000;
        let stripe = stripe_with_sub("sub_1", Some("cus_1"), Some(tenant_id), period_end);

        let outcome = activate(&repo, &stripe, "sub_1", None, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied(tenant_id));

        let stored = repo.get(tenant_id).unwrap();
        assert_eq!(stored.billing_status, Some(BillingStatus::Active));
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(
            stored.current_period_end,
            OffsetDateTime::from_unix_timestamp(period_end).ok()
        );
        assert_eq!(stored.trial_ends_at, None);
        assert_eq!(stored.grace_ends_at, None);
    }

    #[tokio::test]
    async fn activate_is_idempotent_across_redeliveries() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        repo.insert(TenantRecord::new(tenant_id));
        let stripe = stripe_with_sub("sub_1", Some("cus_1"), Some(tenant_id), 1_705_000_000);

        activate(&repo, &stripe, "sub_1", None, None).await.unwrap();
        let first = repo.get(tenant_id).unwrap();
        activate(&repo, &stripe, "sub_1", None, None).await.unwrap();
        let second = repo.get(tenant_id).unwrap();

        assert_eq!(first.billing_status, second.billing_status);
        assert_eq!(first.current_period_end, second.current_period_end);
        assert_eq!(first.stripe_subscription_id, second.stripe_subscription_id);
    }

    #[tokio::test]
    async fn activate_after_cancel_reactivates() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut record = TenantRecord::new(tenant_id);
        record.stripe_subscription_id = Some("sub_1".into());
        repo.insert(record);
        let stripe = stripe_with_sub("sub_1", Some("cus_1"), None, 1_705_000_000);

        cancel(&repo, "sub_1", None, None, None).await.unwrap();
        assert_eq!(
            repo.get(tenant_id).unwrap().billing_status,
            Some(BillingStatus::Canceled)
        );

        // Two racing activations both land on active; last writer wins and
        // there is nothing to merge.
        let (a, b) = tokio::join!(
            activate(&repo, &stripe, "sub_1", None, None),
            activate(&repo, &stripe, "sub_1", None, None),
        );
        assert_eq!(a.unwrap(), TransitionOutcome::Applied(tenant_id));
        assert_eq!(b.unwrap(), TransitionOutcome::Applied(tenant_id));
        assert_eq!(
            repo.get(tenant_id).unwrap().billing_status,
            Some(BillingStatus::Active)
        );
    }

    #[tokio::test]
    async fn activate_unknown_subscription_is_soft_unresolved() {
        let repo = MockTenantRepo::default();
        let stripe = MockStripeService::new();

        let outcome = activate(&repo, &stripe, "sub_ghost", None, None).await.unwrap();
        assert_eq!(outcome, TransitionOutcome::Unresolved);
    }

    #[tokio::test]
    async fn mark_past_due_sets_grace_seven_days_out() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut record = TenantRecord::new(tenant_id);
        record.stripe_customer_id = Some("cus_1".into());
        repo.insert(record);
        let stripe = MockStripeService::new();

        let outcome = mark_past_due(&repo, &stripe, None, Some("cus_1"), now())
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied(tenant_id));

        let stored = repo.get(tenant_id).unwrap();
        assert_eq!(stored.billing_status, Some(BillingStatus::PastDue));
        assert_eq!(stored.grace_ends_at, Some(now() + Duration::days(7)));
    }

    #[tokio::test]
    async fn grace_deadline_only_extends_under_reordered_failures() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut record = TenantRecord::new(tenant_id);
        record.stripe_customer_id = Some("cus_1".into());
        repo.insert(record);
        let stripe = MockStripeService::new();

        let late = now();
        let early = now() - Duration::days(3);

        mark_past_due(&repo, &stripe, None, Some("cus_1"), late)
            .await
            .unwrap();
        let deadline_after_late = repo.get(tenant_id).unwrap().grace_ends_at;

        // Out-of-order duplicate from an earlier failure must not rewind
        // the clock.
        mark_past_due(&repo, &stripe, None, Some("cus_1"), early)
            .await
            .unwrap();
        let deadline_after_early = repo.get(tenant_id).unwrap().grace_ends_at;

        assert_eq!(deadline_after_late, Some(late + Duration::days(7)));
        assert_eq!(deadline_after_early, deadline_after_late);
    }

    #[tokio::test]
    async fn cancel_retains_subscription_ref_and_clears_grace() {
        let tenant_id = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        let mut record = TenantRecord::new(tenant_id);
        record.stripe_subscription_id = Some("sub_1".into());
        record.grace_ends_at = Some(now() + Duration::days(2));
        repo.insert(record);

        let final_end = now() + Duration::days(12);
        let outcome = cancel(&repo, "sub_1", None, None, Some(final_end))
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Applied(tenant_id));

        let stored = repo.get(tenant_id).unwrap();
        assert_eq!(stored.billing_status, Some(BillingStatus::Canceled));
        assert_eq!(stored.stripe_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(stored.grace_ends_at, None);
        assert_eq!(stored.current_period_end, Some(final_end));
    }

    #[tokio::test]
    async fn unresolved_transitions_do_not_mutate_anything() {
        let bystander = Uuid::new_v4();
        let repo = MockTenantRepo::default();
        repo.insert(TenantRecord::new(bystander));
        let stripe = MockStripeService::new();

        let outcome = mark_past_due(&repo, &stripe, Some("sub_ghost"), Some("cus_ghost"), now())
            .await
            .unwrap();
        assert_eq!(outcome, TransitionOutcome::Unresolved);

        let stored = repo.get(bystander).unwrap();
        assert_eq!(stored.billing_status, None);
        assert_eq!(stored.grace_ends_at, None);
    }
}
