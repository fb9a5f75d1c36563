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
pub struct CreateInvoicePayload {
    pub total_cents: i64,
}

// POST /api/invoices
pub async fn create_invoice(
    State(app_state): State<AppState>,
    AuthSession(claims): AuthSession,
    Json(payload): Json<CreateInvoicePayload>,
) -> Response {
    match app_state
        .shop
        .insert_invoice(claims.tenant_id, payload.total_cents)
        .await
    {
        Ok(id) => {
            beta::spawn_tracking(
                app_state.clone(),
                claims.tenant_id,
                BetaSignal::InvoiceCreated,
            );
            (StatusCode::CREATED, Json(json!({ "id": id }))).into_response()
        }
        Err(err) => {
            error!(?err, tenant_id = %claims.tenant_id, "failed to create invoice");
            JsonResponse::server_error("could not create invoice").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::mock_db::{MockShopRepo, MockTenantRepo, TenantRecord};
    use crate::routes::auth::Claims;
    use crate::state::test_helpers::test_app_state;
    use crate::utils::jwt::create_jwt;
    use axum::body::Body;
    use axum::http::{header, Request as HttpRequest};
    use axum::routing::post;
    use axum::Router;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[tokio::test]
    async fn creating_an_invoice_never_fails_over_beta_tracking() {
        let tenant_id = Uuid::new_v4();
        let shop = Arc::new(MockShopRepo::default());
        // Tenant repo errors would make the spawned tracking task fail;
        // the request must still succeed.
        let tenants = Arc::new(MockTenantRepo {
            should_fail: true,
            ..Default::default()
        });
        tenants.tenants.lock().unwrap().insert(
            tenant_id,
            TenantRecord::new(tenant_id),
        );

        let mut state = test_app_state();
        state.shop = shop.clone();
        state.tenants = tenants;

        let claims = Claims {
            tenant_id,
            ..Claims::test_claims()
        };
        let jwt = create_jwt(
            claims,
            &state.jwt_keys,
            &state.config.jwt_issuer,
            &state.config.jwt_audience,
        )
        .unwrap();

        let router = Router::new()
            .route("/api/invoices", post(create_invoice))
            .with_state(state);

        let resp = router
            .oneshot(
                HttpRequest::builder()
                    .method("POST")
                    .uri("/api/invoices")
                    .header(header::COOKIE, format!("auth_token={}", jwt))
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"total_cents":14500}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::CREATED);
        let inserted = shop.invoices.lock().unwrap().clone();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0], (tenant_id, 14500));
    }
}
