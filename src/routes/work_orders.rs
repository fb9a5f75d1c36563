use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::responses::JsonResponse;
use crate::routes::auth::AuthSession;
use crate::services::beta::{self, BetaSignal};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateWorkOrderPayload {
    pub summary: String,
}

// POST /api/work-orders
//
// Deliberately thin: the full work-order CRUD surface lives with the rest
// of the shop routes. What matters here is that creation fires the beta
// activation signal without ever failing the request over it.
pub async fn create_work_order(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
    Json(payload): Json<CreateWorkOrderPayload>,
) -> Response {
    match app_state
        .shop
        .insert_work_order(claims.tenant_id, &payload.summary)
        .await
    {
        Ok(id) => {
            beta::spawn_tracking(
                app_state.clone(),
                claims.tenant_id,
                BetaSignal::WorkOrderCreated,
            );
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(err) => {
            error!(?err, tenant_id = %claims.tenant_id, "failed to create work order");
            JsonResponse::server_error("could not create work order").into_response()
        }
    }
}
