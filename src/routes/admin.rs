use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::tenant::ActorRole;
use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BillingExemptPayload {
    pub exempt: bool,
    pub reason: Option<String>,
}

// POST /api/admin/tenants/{tenant_id}/billing-exempt
//
// Operator-only switch that bypasses all billing gating for a tenant.
pub async fn set_billing_exempt(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
    Path(tenant_id): Path<Uuid>,
    Json(payload): Json<BillingExemptPayload>,
) -> Response {
    if claims.role != Some(ActorRole::Admin) {
        return JsonResponse::forbidden("Admin role required").into_response();
    }

    match app_state
        .tenants
        .set_billing_exempt(tenant_id, payload.exempt, payload.reason.as_deref())
        .await
    {
        Ok(true) => {
            info!(%tenant_id, exempt = payload.exempt, "billing exemption updated");
            JsonResponse::success("Billing exemption updated").into_response()
        }
        Ok(false) => JsonResponse::not_found("Tenant not found").into_response(),
        Err(err) => {
            error!(?err, %tenant_id, "failed to update billing exemption");
            JsonResponse::server_error("could not update billing exemption").into_response()
        }
    }
}
