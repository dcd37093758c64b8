use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::{error::AppError, scope::Scope};

/// Authenticated caller, resolved from the `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub i64);

impl AuthUser {
    /// Owner filter for everything this caller may touch.
    pub fn scope(&self) -> Scope {
        Scope::owner(self.0)
    }
}

/// Accepts `Bearer <token>` and the `Token <token>` scheme.
fn bearer_token(header: &str) -> Option<&str> {
    ["Bearer ", "bearer ", "Token ", "token "]
        .iter()
        .find_map(|scheme| header.strip_prefix(scheme))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Auth("authentication credentials were not provided".into()))?;

        let token = bearer_token(header)
            .ok_or_else(|| AppError::Auth("invalid Authorization header".into()))?;

        let keys = JwtKeys::from_ref(state);
        let claims = keys.verify_access(token).map_err(|e| {
            warn!(error = %e, "rejected token");
            AppError::Auth("invalid or expired token".into())
        })?;

        Ok(AuthUser(claims.sub))
    }
}
