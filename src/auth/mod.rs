pub mod jwt;
pub mod password;
pub mod principal;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use serde::{Deserialize, Serialize};

use crate::{error::AppError, state::AppState};

pub const ROLE_ADMIN: &str = "Admin";
pub const ROLE_REGISTRAR: &str = "Registrar";
pub const ROLE_STUDENT: &str = "Student";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedPrincipal {
    pub principal_id: String,
    pub name: String,
    pub role: String,
}

impl AuthenticatedPrincipal {
    /// Registrar-side operations are open to office staff only.
    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.role == ROLE_ADMIN || self.role == ROLE_REGISTRAR {
            Ok(())
        } else {
            Err(AppError::forbidden())
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::unauthorized())?;

        let claims = state
            .jwt
            .verify_token(bearer.token())
            .map_err(|_| AppError::unauthorized())?;

        Ok(AuthenticatedPrincipal {
            principal_id: claims.sub,
            name: claims.name,
            role: claims.role,
        })
    }
}
