use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::beta_slot_repository::BetaSlotRepository;
use crate::db::tenant_repository::{BetaPromotionGuard, TenantRepository};
use crate::state::AppState;

/// A candidate must hit the activation thresholds within this many days of
/// candidacy start or the candidacy expires, terminally.
pub const CANDIDACY_WINDOW_DAYS: i64 = 7;
pub const WORK_ORDER_THRESHOLD: i32 = 3;
pub const INVOICE_THRESHOLD: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetaSignal {
    WorkOrderCreated,
    InvoiceCreated,
}

/// Fire-and-forget entry point used after work-order/invoice creation.
/// Runs on a detached task; failures are logged and never reach the
/// request that triggered the signal.
pub fn spawn_tracking(state: AppState, tenant_id: Uuid, signal: BetaSignal) {
    tokio::spawn(async move {
        let cap = state.config.beta_slot_cap;
        match track_activity(
            state.tenants.as_ref(),
            state.beta_slots.as_ref(),
            tenant_id,
            signal,
            cap,
            OffsetDateTime::now_utc(),
        )
        .await
        {
            Ok(true) => info!(%tenant_id, "tenant promoted to beta tester"),
            Ok(false) => {}
            Err(err) => warn!(?err, %tenant_id, "beta tracking failed"),
        }
    });
}

/// Records one activation signal and attempts promotion when the tenant
/// becomes eligible. Returns whether this call promoted the tenant.
///
/// Slot accounting is strictly conditional: claim a slot only below the
/// cap, and hand it back when the guarded promotion update matches no row
/// (a concurrent attempt won, or eligibility evaporated between read and
/// write).
pub async fn track_activity(
    tenants: &dyn TenantRepository,
    slots: &dyn BetaSlotRepository,
    tenant_id: Uuid,
    signal: BetaSignal,
    cap: i64,
    now: OffsetDateTime,
) -> Result<bool, sqlx::Error> {
    match signal {
        BetaSignal::WorkOrderCreated => tenants.increment_beta_work_orders(tenant_id).await?,
        BetaSignal::InvoiceCreated => tenants.increment_beta_invoices(tenant_id).await?,
    }

    let Some(candidacy) = tenants.beta_candidacy(tenant_id).await? else {
        return Ok(false);
    };

    if !candidacy.beta_candidate || candidacy.is_beta_tester {
        return Ok(false);
    }

    let Some(since) = candidacy.beta_candidate_since else {
        return Ok(false);
    };

    let window_start_cutoff = now - Duration::days(CANDIDACY_WINDOW_DAYS);
    if since < window_start_cutoff {
        // Terminal expiry, persisted even though no promotion was
        // attempted, so the tenant stops being rechecked.
        tenants.expire_beta_candidacy(tenant_id).await?;
        info!(%tenant_id, "beta candidacy window elapsed without promotion");
        return Ok(false);
    }

    if candidacy.beta_work_orders_created < WORK_ORDER_THRESHOLD
        || candidacy.beta_invoices_created < INVOICE_THRESHOLD
    {
        return Ok(false);
    }

    ensure_counter(tenants, slots).await?;

    if !slots.try_claim(cap).await? {
        info!(%tenant_id, "beta slots exhausted; promotion not attempted");
        return Ok(false);
    }

    let promoted = tenants
        .promote_beta_candidate(
            tenant_id,
            BetaPromotionGuard {
                candidate_since_after: window_start_cutoff,
                min_work_orders: WORK_ORDER_THRESHOLD,
                min_invoices: INVOICE_THRESHOLD,
            },
            now,
        )
        .await?;

    if !promoted {
        // Lost the race for this tenant; the slot goes back.
        if !slots.release().await? {
            warn!(%tenant_id, "beta slot release matched nothing");
        }
        return Ok(false);
    }

    Ok(true)
}

/// Lazily seed the counter from a scan of already-promoted tenants. Two
/// instances racing here both compute a count; the unique insert lets
/// exactly one win and the loser's value is discarded.
async fn ensure_counter(
    tenants: &dyn TenantRepository,
    slots: &dyn BetaSlotRepository,
) -> Result<(), sqlx::Error> {
    if slots.is_initialized().await? {
        return Ok(());
    }
    let already_promoted = tenants.count_beta_testers().await?;
    slots.initialize(already_promoted).await
}
