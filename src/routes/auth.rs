use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{principal, AuthenticatedPrincipal},
    error::{AppError, AppResult},
    state::AppState,
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct PrincipalInfo {
    pub id: String,
    pub firstname: String,
    pub lastname: String,
    pub role: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub principal: PrincipalInfo,
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut conn = state.db()?;

    // No-match and wrong-password are indistinguishable to the caller.
    let matched = principal::authenticate(&mut conn, &payload.username, &payload.password)?
        .ok_or_else(AppError::unauthorized)?;

    let access_token =
        state
            .jwt
            .generate_token(matched.id(), &matched.full_name(), matched.role())?;

    info!(principal_id = %matched.id(), role = %matched.role(), "login succeeded");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.jwt_expiry_minutes * 60,
        principal: PrincipalInfo {
            id: matched.id().to_string(),
            firstname: matched.firstname().to_string(),
            lastname: matched.lastname().to_string(),
            role: matched.role().to_string(),
        },
    }))
}

pub async fn me(principal: AuthenticatedPrincipal) -> Json<AuthenticatedPrincipal> {
    Json(principal)
}
