use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::tenant::ActorRole;
use crate::state::AppState;
use crate::utils::jwt::decode_jwt;

/// Issued by the identity layer, which is outside this repo. Everything
/// downstream consumes only the tenant id and the actor role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub tenant_id: Uuid,
    pub email: String,
    pub role: Option<ActorRole>,
    pub iss: String,
    pub aud: String,
    pub exp: usize,
}

impl Claims {
    #[cfg(test)]
    pub fn test_claims() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        Self {
            tenant_id: Uuid::new_v4(),
            email: "owner@example.com".into(),
            role: Some(ActorRole::Staff),
            iss: String::new(),
            aud: String::new(),
            exp: (SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_secs()
                + 3600) as usize,
        }
    }
}

#[derive(Debug, PartialEq)]
pub struct AuthSession(pub Claims);

impl FromRequestParts<AppState> for AuthSession {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar.get("auth_token").ok_or(StatusCode::UNAUTHORIZED)?;

        let claims = decode_jwt(
            token.value(),
            &state.jwt_keys,
            &state.config.jwt_issuer,
            &state.config.jwt_audience,
        )
        .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(AuthSession(claims.claims))
    }
}
