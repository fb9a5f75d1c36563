use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{error, warn};

use crate::models::tenant::TenantBillingSnapshot;
use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::services::billing::TENANT_METADATA_KEY;
use crate::services::stripe::{CheckoutLineItem, CheckoutMode, CreateCheckoutSessionRequest};
use crate::state::AppState;
use crate::utils::access::derive_access;

fn rfc3339(value: Option<OffsetDateTime>) -> serde_json::Value {
    match value.and_then(|dt| dt.format(&Rfc3339).ok()) {
        Some(s) => serde_json::Value::String(s),
        None => serde_json::Value::Null,
    }
}

async fn load_snapshot(
    app_state: &AppState,
    tenant_id: uuid::Uuid,
) -> Result<TenantBillingSnapshot, Response> {
    match app_state.tenants.billing_snapshot(tenant_id).await {
        Ok(Some(snapshot)) => Ok(snapshot),
        Ok(None) => {
            warn!(%tenant_id, "billing lookup for unknown tenant");
            Err(JsonResponse::not_found("Tenant not found").into_response())
        }
        Err(err) => {
            error!(?err, %tenant_id, "failed to load tenant billing fields");
            Err(JsonResponse::server_error("billing state unavailable").into_response())
        }
    }
}

// GET /api/billing/status
pub async fn billing_status(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> Response {
    let snapshot = match load_snapshot(&app_state, claims.tenant_id).await {
        Ok(snapshot) => snapshot,
        Err(resp) => return resp,
    };

    let decision = derive_access(&snapshot, OffsetDateTime::now_utc());

    Json(json!({
        "locked": decision.locked,
        "reason": decision.reason,
        "lock_date": rfc3339(decision.lock_date),
        "days_until_lock": decision.days_until_lock,
        "warning": decision.warning,
        "show_billing_cta": !snapshot.billing_exempt,
        "locked_context": decision.locked_context,
        "billing_status": snapshot.billing_status,
        "trial_ends_at": rfc3339(snapshot.trial_ends_at),
        "grace_ends_at": rfc3339(snapshot.grace_ends_at),
        "current_period_end": rfc3339(snapshot.current_period_end),
    }))
    .into_response()
}

/// Middleware for every billing-protected route. Reads the same fields and
/// runs the same derivation as the status endpoint, so the two can never
/// disagree about whether a tenant is locked.
pub async fn require_active_billing(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
    request: Request,
    next: Next,
) -> Response {
    let snapshot = match load_snapshot(&app_state, claims.tenant_id).await {
        Ok(snapshot) => snapshot,
        Err(resp) => return resp,
    };

    let decision = derive_access(&snapshot, OffsetDateTime::now_utc());
    if decision.locked {
        return (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "code": "BILLING_LOCKED",
                "message": "Your account is locked. Update billing to regain access.",
                "billing_status": snapshot.billing_status,
                "grace_ends_at": rfc3339(snapshot.grace_ends_at),
                "current_period_end": rfc3339(snapshot.current_period_end),
                "trial_ends_at": rfc3339(snapshot.trial_ends_at),
            })),
        )
            .into_response();
    }

    next.run(request).await
}

// POST /api/billing/checkout
pub async fn create_checkout(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
) -> Response {
    let tenant = match app_state.tenants.find_tenant_by_id(claims.tenant_id).await {
        Ok(Some(tenant)) => tenant,
        Ok(None) => return JsonResponse::not_found("Tenant not found").into_response(),
        Err(err) => {
            error!(?err, tenant_id = %claims.tenant_id, "failed to load tenant for checkout");
            return JsonResponse::server_error("checkout unavailable").into_response();
        }
    };

    // Provider customer is created lazily on first checkout and the ref
    // persisted so webhook resolution can fall back to it.
    let customer_id = match tenant.stripe_customer_id {
        Some(id) => id,
        None => {
            let created = match app_state
                .stripe
                .create_customer(&claims.email, Some(&tenant.name))
                .await
            {
                Ok(id) => id,
                Err(err) => {
                    error!(?err, tenant_id = %tenant.id, "failed to create stripe customer");
                    return JsonResponse::server_error("checkout unavailable").into_response();
                }
            };
            if let Err(err) = app_state
                .tenants
                .set_stripe_customer_id(tenant.id, &created)
                .await
            {
                error!(?err, tenant_id = %tenant.id, "failed to persist stripe customer id");
                return JsonResponse::server_error("checkout unavailable").into_response();
            }
            created
        }
    };

    let req = CreateCheckoutSessionRequest {
        success_url: format!("{}/billing/success", app_state.config.frontend_origin),
        cancel_url: format!("{}/billing", app_state.config.frontend_origin),
        mode: CheckoutMode::Subscription,
        line_items: vec![CheckoutLineItem {
            price: app_state.config.stripe.price_id.clone(),
            quantity: 1,
        }],
        client_reference_id: Some(tenant.id.to_string()),
        customer: Some(customer_id),
        metadata: Some(
            [(TENANT_METADATA_KEY.to_string(), tenant.id.to_string())]
                .into_iter()
                .collect(),
        ),
    };

    match app_state.stripe.create_checkout_session(req).await {
        Ok(session) => Json(json!({ "id": session.id, "url": session.url })).into_response(),
        Err(err) => {
            error!(?err, tenant_id = %tenant.id, "failed to create checkout session");
            JsonResponse::server_error("checkout unavailable").into_response()
        }
    }
}
