#![allow(dead_code)]
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::beta_slot_repository::BetaSlotRepository;
use crate::db::shop_repository::ShopRepository;
use crate::db::stripe_event_log_repository::StripeEventLogRepository;
use crate::db::tenant_repository::{BetaPromotionGuard, TenantRepository};
use crate::models::tenant::{BetaCandidacy, BillingStatus, Tenant, TenantBillingSnapshot};

/// One in-memory tenant row. Mock updates apply the same guards the SQL
/// statements do, so tests exercise the real conditional-update semantics.
#[derive(Debug, Clone)]
pub struct TenantRecord {
    pub id: Uuid,
    pub name: String,
    pub billing_status: Option<BillingStatus>,
    pub current_period_end: Option<OffsetDateTime>,
    pub grace_ends_at: Option<OffsetDateTime>,
    pub trial_ends_at: Option<OffsetDateTime>,
    pub billing_exempt: bool,
    pub billing_exempt_reason: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub beta_candidate: bool,
    pub beta_candidate_since: Option<OffsetDateTime>,
    pub beta_work_orders_created: i32,
    pub beta_invoices_created: i32,
    pub is_beta_tester: bool,
    pub beta_activated_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

impl TenantRecord {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            name: "Test Shop".into(),
            billing_status: None,
            current_period_end: None,
            grace_ends_at: None,
            trial_ends_at: None,
            billing_exempt: false,
            billing_exempt_reason: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            beta_candidate: false,
            beta_candidate_since: None,
            beta_work_orders_created: 0,
            beta_invoices_created: 0,
            is_beta_tester: false,
            beta_activated_at: None,
            created_at: OffsetDateTime::now_utc(),
        }
    }
}

#[derive(Default)]
pub struct MockTenantRepo {
    pub tenants: Mutex<HashMap<Uuid, TenantRecord>>,
    pub should_fail: bool,
}

impl MockTenantRepo {
    pub fn with_tenant(record: TenantRecord) -> Self {
        let repo = Self::default();
        repo.tenants.lock().unwrap().insert(record.id, record);
        repo
    }

    pub fn insert(&self, record: TenantRecord) {
        self.tenants.lock().unwrap().insert(record.id, record);
    }

    pub fn get(&self, tenant_id: Uuid) -> Option<TenantRecord> {
        self.tenants.lock().unwrap().get(&tenant_id).cloned()
    }

    fn fail(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock tenant repo failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantRepository for MockTenantRepo {
    async fn find_tenant_by_id(&self, tenant_id: Uuid) -> Result<Option<Tenant>, sqlx::Error> {
        self.fail()?;
        Ok(self.get(tenant_id).map(|r| Tenant {
            id: r.id,
            name: r.name,
            billing_status: r.billing_status,
            current_period_end: r.current_period_end,
            grace_ends_at: r.grace_ends_at,
            trial_ends_at: r.trial_ends_at,
            billing_exempt: r.billing_exempt,
            billing_exempt_reason: r.billing_exempt_reason,
            stripe_customer_id: r.stripe_customer_id,
            stripe_subscription_id: r.stripe_subscription_id,
            is_beta_tester: r.is_beta_tester,
            created_at: r.created_at,
        }))
    }

    async fn billing_snapshot(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<TenantBillingSnapshot>, sqlx::Error> {
        self.fail()?;
        Ok(self.get(tenant_id).map(|r| TenantBillingSnapshot {
            billing_exempt: r.billing_exempt,
            billing_status: r.billing_status,
            current_period_end: r.current_period_end,
            grace_ends_at: r.grace_ends_at,
            trial_ends_at: r.trial_ends_at,
        }))
    }

    async fn find_tenant_id_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.fail()?;
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|r| r.stripe_subscription_id.as_deref() == Some(subscription_id))
            .map(|r| r.id))
    }

    async fn find_tenant_id_by_customer_id(
        &self,
        customer_id: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        self.fail()?;
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .find(|r| r.stripe_customer_id.as_deref() == Some(customer_id))
            .map(|r| r.id))
    }

    async fn set_stripe_customer_id(
        &self,
        tenant_id: Uuid,
        customer_id: &str,
    ) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.stripe_customer_id = Some(customer_id.to_string());
        }
        Ok(())
    }

    async fn activate_billing(
        &self,
        tenant_id: Uuid,
        subscription_id: &str,
        customer_id: Option<&str>,
        current_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.billing_status = Some(BillingStatus::Active);
            r.stripe_subscription_id = Some(subscription_id.to_string());
            if let Some(customer_id) = customer_id {
                r.stripe_customer_id = Some(customer_id.to_string());
            }
            r.current_period_end = current_period_end;
            r.trial_ends_at = None;
            r.grace_ends_at = None;
        }
        Ok(())
    }

    async fn mark_past_due(
        &self,
        tenant_id: Uuid,
        grace_candidate: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.billing_status = Some(BillingStatus::PastDue);
            r.grace_ends_at = Some(match r.grace_ends_at {
                Some(existing) if existing > grace_candidate => existing,
                _ => grace_candidate,
            });
        }
        Ok(())
    }

    async fn cancel_billing(
        &self,
        tenant_id: Uuid,
        final_period_end: Option<OffsetDateTime>,
    ) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.billing_status = Some(BillingStatus::Canceled);
            r.current_period_end = final_period_end;
            r.grace_ends_at = None;
        }
        Ok(())
    }

    async fn set_billing_exempt(
        &self,
        tenant_id: Uuid,
        exempt: bool,
        reason: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        self.fail()?;
        let mut tenants = self.tenants.lock().unwrap();
        match tenants.get_mut(&tenant_id) {
            Some(r) => {
                r.billing_exempt = exempt;
                r.billing_exempt_reason = reason.map(|s| s.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn beta_candidacy(
        &self,
        tenant_id: Uuid,
    ) -> Result<Option<BetaCandidacy>, sqlx::Error> {
        self.fail()?;
        Ok(self.get(tenant_id).map(|r| BetaCandidacy {
            beta_candidate: r.beta_candidate,
            beta_candidate_since: r.beta_candidate_since,
            beta_work_orders_created: r.beta_work_orders_created,
            beta_invoices_created: r.beta_invoices_created,
            is_beta_tester: r.is_beta_tester,
        }))
    }

    async fn increment_beta_work_orders(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.beta_work_orders_created += 1;
        }
        Ok(())
    }

    async fn increment_beta_invoices(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.beta_invoices_created += 1;
        }
        Ok(())
    }

    async fn expire_beta_candidacy(&self, tenant_id: Uuid) -> Result<(), sqlx::Error> {
        self.fail()?;
        if let Some(r) = self.tenants.lock().unwrap().get_mut(&tenant_id) {
            r.beta_candidate = false;
        }
        Ok(())
    }

    async fn promote_beta_candidate(
        &self,
        tenant_id: Uuid,
        guard: BetaPromotionGuard,
        promoted_at: OffsetDateTime,
    ) -> Result<bool, sqlx::Error> {
        self.fail()?;
        let mut tenants = self.tenants.lock().unwrap();
        let Some(r) = tenants.get_mut(&tenant_id) else {
            return Ok(false);
        };

        let since_ok = r
            .beta_candidate_since
            .map(|since| since >= guard.candidate_since_after)
            .unwrap_or(false);
        let eligible = r.beta_candidate
            && !r.is_beta_tester
            && since_ok
            && r.beta_work_orders_created >= guard.min_work_orders
            && r.beta_invoices_created >= guard.min_invoices;

        if !eligible {
            return Ok(false);
        }

        r.is_beta_tester = true;
        r.beta_candidate = false;
        r.beta_activated_at = Some(promoted_at);
        Ok(true)
    }

    async fn count_beta_testers(&self) -> Result<i64, sqlx::Error> {
        self.fail()?;
        Ok(self
            .tenants
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.is_beta_tester)
            .count() as i64)
    }
}

#[derive(Default)]
pub struct MockStripeEventLog {
    pub rows: Mutex<HashMap<String, (String, Option<OffsetDateTime>)>>,
    pub fail_record: bool,
    pub fail_mark_processed: bool,
}

impl MockStripeEventLog {
    pub fn processed_at(&self, event_id: &str) -> Option<OffsetDateTime> {
        self.rows
            .lock()
            .unwrap()
            .get(event_id)
            .and_then(|(_, processed)| *processed)
    }

    pub fn contains(&self, event_id: &str) -> bool {
        self.rows.lock().unwrap().contains_key(event_id)
    }
}

#[async_trait]
impl StripeEventLogRepository for MockStripeEventLog {
    async fn record_event(&self, event_id: &str, event_type: &str) -> Result<bool, sqlx::Error> {
        if self.fail_record {
            return Err(sqlx::Error::Protocol("mock event log failure".into()));
        }
        let mut rows = self.rows.lock().unwrap();
        if rows.contains_key(event_id) {
            return Ok(false);
        }
        rows.insert(event_id.to_string(), (event_type.to_string(), None));
        Ok(true)
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        processed_at: OffsetDateTime,
    ) -> Result<(), sqlx::Error> {
        if self.fail_mark_processed {
            return Err(sqlx::Error::Protocol("mock event log failure".into()));
        }
        if let Some(row) = self.rows.lock().unwrap().get_mut(event_id) {
            row.1 = Some(processed_at);
        }
        Ok(())
    }
}

/// Counter mock whose claim/release hold the lock across the
/// read-check-write, mirroring the atomicity of the conditional UPDATE.
#[derive(Default)]
pub struct MockBetaSlots {
    pub claimed: Mutex<Option<i64>>,
    pub should_fail: bool,
}

impl MockBetaSlots {
    pub fn initialized(claimed: i64) -> Self {
        Self {
            claimed: Mutex::new(Some(claimed)),
            should_fail: false,
        }
    }

    pub fn current(&self) -> Option<i64> {
        *self.claimed.lock().unwrap()
    }

    fn fail(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock beta slots failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BetaSlotRepository for MockBetaSlots {
    async fn is_initialized(&self) -> Result<bool, sqlx::Error> {
        self.fail()?;
        Ok(self.claimed.lock().unwrap().is_some())
    }

    async fn initialize(&self, claimed: i64) -> Result<(), sqlx::Error> {
        self.fail()?;
        let mut guard = self.claimed.lock().unwrap();
        if guard.is_none() {
            *guard = Some(claimed);
        }
        Ok(())
    }

    async fn try_claim(&self, cap: i64) -> Result<bool, sqlx::Error> {
        self.fail()?;
        let mut guard = self.claimed.lock().unwrap();
        match guard.as_mut() {
            Some(claimed) if *claimed < cap => {
                *claimed += 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self) -> Result<bool, sqlx::Error> {
        self.fail()?;
        let mut guard = self.claimed.lock().unwrap();
        match guard.as_mut() {
            Some(claimed) if *claimed > 0 => {
                *claimed -= 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MockShopRepo {
    pub work_orders: Mutex<Vec<(Uuid, String)>>,
    pub invoices: Mutex<Vec<(Uuid, i64)>>,
    pub should_fail: bool,
}

#[async_trait]
impl ShopRepository for MockShopRepo {
    async fn insert_work_order(
        &self,
        tenant_id: Uuid,
        summary: &str,
    ) -> Result<Uuid, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock shop repo failure".into()));
        }
        self.work_orders
            .lock()
            .unwrap()
            .push((tenant_id, summary.to_string()));
        Ok(Uuid::new_v4())
    }

    async fn insert_invoice(
        &self,
        tenant_id: Uuid,
        total_cents: i64,
    ) -> Result<Uuid, sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("mock shop repo failure".into()));
        }
        self.invoices.lock().unwrap().push((tenant_id, total_cents));
        Ok(Uuid::new_v4())
    }
}
