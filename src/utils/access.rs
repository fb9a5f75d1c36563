use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::models::tenant::{BillingStatus, TenantBillingSnapshot};

/// How long a past-due tenant keeps access after a failed payment.
pub const GRACE_WINDOW_DAYS: i64 = 7;

/// Effective lifecycle state for a tenant at a given instant. The persisted
/// fields stay flat; this tagged form exists so the precedence rules below
/// are auditable in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Exempt,
    Active,
    Trialing { ends_at: OffsetDateTime },
    Grace { ends_at: OffsetDateTime },
    Locked { context: LockedContext },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessReason {
    Active,
    Trial,
    Grace,
    Locked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LockedContext {
    TrialEnded,
    PastDueEnded,
    PaymentRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockWarning {
    #[serde(rename = "3_day")]
    ThreeDay,
    #[serde(rename = "7_day")]
    SevenDay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessDecision {
    pub locked: bool,
    pub reason: AccessReason,
    pub lock_date: Option<OffsetDateTime>,
    pub days_until_lock: Option<i64>,
    pub warning: Option<LockWarning>,
    pub locked_context: Option<LockedContext>,
}

/// Classify the tenant's effective state. First matching rule wins:
/// exempt, then paid-and-unexpired, then trial, then grace, then locked.
/// An `active` status whose period has silently elapsed is not trusted and
/// falls through to the later rules.
pub fn classify(snapshot: &TenantBillingSnapshot, now: OffsetDateTime) -> AccessState {
    if snapshot.billing_exempt {
        return AccessState::Exempt;
    }

    if snapshot.billing_status == Some(BillingStatus::Active) {
        if let Some(period_end) = snapshot.current_period_end {
            if period_end > now {
                return AccessState::Active;
            }
        }
    }

    if let Some(trial_ends_at) = snapshot.trial_ends_at {
        if trial_ends_at > now {
            return AccessState::Trialing {
                ends_at: trial_ends_at,
            };
        }
    }

    if snapshot.billing_status == Some(BillingStatus::PastDue) {
        if let Some(grace_ends_at) = snapshot.grace_ends_at {
            if grace_ends_at > now {
                return AccessState::Grace {
                    ends_at: grace_ends_at,
                };
            }
        }
    }

    // Trial data takes priority over past-due data when classifying why
    // the tenant ended up locked.
    let context = if snapshot.trial_ends_at.is_some() {
        LockedContext::TrialEnded
    } else if snapshot.billing_status == Some(BillingStatus::PastDue) {
        LockedContext::PastDueEnded
    } else {
        LockedContext::PaymentRequired
    };

    AccessState::Locked { context }
}

/// Pure derivation of the gate decision from the tenant's billing fields
/// and wall-clock time. Both the request-gating middleware and the status
/// endpoint call this exact function.
pub fn derive_access(snapshot: &TenantBillingSnapshot, now: OffsetDateTime) -> AccessDecision {
    match classify(snapshot, now) {
        AccessState::Exempt | AccessState::Active => AccessDecision {
            locked: false,
            reason: AccessReason::Active,
            lock_date: None,
            days_until_lock: None,
            warning: None,
            locked_context: None,
        },
        AccessState::Trialing { ends_at } => unlocked_until(AccessReason::Trial, ends_at, now),
        AccessState::Grace { ends_at } => unlocked_until(AccessReason::Grace, ends_at, now),
        AccessState::Locked { context } => AccessDecision {
            locked: true,
            reason: AccessReason::Locked,
            lock_date: None,
            days_until_lock: None,
            warning: None,
            locked_context: Some(context),
        },
    }
}

fn unlocked_until(
    reason: AccessReason,
    lock_date: OffsetDateTime,
    now: OffsetDateTime,
) -> AccessDecision {
    let days = days_until(lock_date, now);
    let warning = if days <= 3 {
        Some(LockWarning::ThreeDay)
    } else if days <= 7 {
        Some(LockWarning::SevenDay)
    } else {
        None
    };

    AccessDecision {
        locked: false,
        reason,
        lock_date: Some(lock_date),
        days_until_lock: Some(days),
        warning,
        locked_context: None,
    }
}

/// Whole days remaining, rounded up, never below zero.
fn days_until(lock_date: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let remaining = lock_date - now;
    if remaining <= Duration::ZERO {
        return 0;
    }
    let secs = remaining.whole_seconds();
    (secs + 86_399) / 86_400
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> TenantBillingSnapshot {
        TenantBillingSnapshot::default()
    }

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    #[test]
    fn exempt_tenant_is_never_locked() {
        let mut snap = snapshot();
        snap.billing_exempt = true;
        snap.billing_status = Some(BillingStatus::Canceled);

        let decision = derive_access(&snap, now());
        assert!(!decision.locked);
        assert_eq!(decision.reason, AccessReason::Active);
        assert_eq!(decision.lock_date, None);
    }

    #[test]
    fn active_with_unexpired_period_is_unlocked_without_lock_date() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::Active);
        snap.current_period_end = Some(now() + Duration::days(20));

        let decision = derive_access(&snap, now());
        assert!(!decision.locked);
        assert_eq!(decision.reason, AccessReason::Active);
        assert_eq!(decision.warning, None);
        assert_eq!(decision.days_until_lock, None);
    }

    #[test]
    fn active_with_elapsed_period_falls_through_to_trial() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::Active);
        snap.current_period_end = Some(now() - Duration::hours(1));
        snap.trial_ends_at = Some(now() + Duration::days(5));

        let decision = derive_access(&snap, now());
        assert!(!decision.locked);
        assert_eq!(decision.reason, AccessReason::Trial);
        assert_eq!(decision.warning, Some(LockWarning::SevenDay));
    }

    #[test]
    fn trial_two_days_out_warns_three_day() {
        let mut snap = snapshot();
        snap.trial_ends_at = Some(now() + Duration::days(2));

        let decision = derive_access(&snap, now());
        assert!(!decision.locked);
        assert_eq!(decision.reason, AccessReason::Trial);
        assert_eq!(decision.days_until_lock, Some(2));
        assert_eq!(decision.warning, Some(LockWarning::ThreeDay));
        assert_eq!(decision.lock_date, snap.trial_ends_at);
    }

    #[test]
    fn trial_far_out_has_no_warning() {
        let mut snap = snapshot();
        snap.trial_ends_at = Some(now() + Duration::days(10));

        let decision = derive_access(&snap, now());
        assert_eq!(decision.warning, None);
        assert_eq!(decision.days_until_lock, Some(10));
    }

    #[test]
    fn days_until_lock_rounds_up_partial_days() {
        let mut snap = snapshot();
        snap.trial_ends_at = Some(now() + Duration::days(2) + Duration::hours(1));

        let decision = derive_access(&snap, now());
        assert_eq!(decision.days_until_lock, Some(3));
    }

    #[test]
    fn past_due_within_grace_is_unlocked() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::PastDue);
        snap.grace_ends_at = Some(now() + Duration::days(4));

        let decision = derive_access(&snap, now());
        assert!(!decision.locked);
        assert_eq!(decision.reason, AccessReason::Grace);
        assert_eq!(decision.warning, Some(LockWarning::SevenDay));
        assert_eq!(decision.lock_date, snap.grace_ends_at);
    }

    #[test]
    fn past_due_with_expired_grace_locks_as_past_due_ended() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::PastDue);
        snap.grace_ends_at = Some(now() - Duration::hours(1));

        let decision = derive_access(&snap, now());
        assert!(decision.locked);
        assert_eq!(decision.reason, AccessReason::Locked);
        assert_eq!(decision.locked_context, Some(LockedContext::PastDueEnded));
    }

    #[test]
    fn expired_trial_locks_as_trial_ended() {
        let mut snap = snapshot();
        snap.trial_ends_at = Some(now() - Duration::days(1));

        let decision = derive_access(&snap, now());
        assert!(decision.locked);
        assert_eq!(decision.locked_context, Some(LockedContext::TrialEnded));
    }

    #[test]
    fn never_subscribed_locks_as_payment_required() {
        let decision = derive_access(&snapshot(), now());
        assert!(decision.locked);
        assert_eq!(
            decision.locked_context,
            Some(LockedContext::PaymentRequired)
        );
    }

    #[test]
    fn canceled_without_trial_locks_as_payment_required() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::Canceled);
        snap.current_period_end = Some(now() - Duration::days(3));

        let decision = derive_access(&snap, now());
        assert!(decision.locked);
        assert_eq!(
            decision.locked_context,
            Some(LockedContext::PaymentRequired)
        );
    }

    #[test]
    fn derivation_is_pure() {
        let mut snap = snapshot();
        snap.billing_status = Some(BillingStatus::PastDue);
        snap.grace_ends_at = Some(now() + Duration::days(2));
        snap.trial_ends_at = Some(now() - Duration::days(30));

        let first = derive_access(&snap, now());
        let second = derive_access(&snap, now());
        assert_eq!(first, second);
    }

    #[test]
    fn warning_serializes_with_day_suffix() {
        assert_eq!(
            serde_json::to_value(LockWarning::ThreeDay).unwrap(),
            serde_json::json!("3_day")
        );
        assert_eq!(
            serde_json::to_value(LockedContext::PastDueEnded).unwrap(),
            serde_json::json!("past_due_ended")
        );
    }
}
