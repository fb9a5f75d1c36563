use core::fmt;

use serde::{Deserialize, Serialize};
use sqlx::{prelude::Type, FromRow};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(sqlx::Type, Debug, Deserialize, Serialize, PartialEq, Eq, Copy, Clone)]
#[sqlx(type_name = "billing_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Active,
    PastDue,
    Canceled,
}

impl fmt::Display for BillingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BillingStatus::Active => "active",
            BillingStatus::PastDue => "past_due",
            BillingStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "actor_role")]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Staff,
    Admin,
}

#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct Tenant {
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
    pub is_beta_tester: bool,
    pub created_at: OffsetDateTime,
}

/// The billing fields the access gate and status endpoint read. Kept small
/// so the gating middleware fetches one narrow row per request.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone, Default)]
pub struct TenantBillingSnapshot {
    pub billing_exempt: bool,
    pub billing_status: Option<BillingStatus>,
    pub current_period_end: Option<OffsetDateTime>,
    pub grace_ends_at: Option<OffsetDateTime>,
    pub trial_ends_at: Option<OffsetDateTime>,
}

/// Beta candidacy fields as read by the slot allocator.
#[derive(Debug, FromRow, Serialize, Deserialize, Clone)]
pub struct BetaCandidacy {
    pub beta_candidate: bool,
    pub beta_candidate_since: Option<OffsetDateTime>,
    pub beta_work_orders_created: i32,
    pub beta_invoices_created: i32,
    pub is_beta_tester: bool,
}
