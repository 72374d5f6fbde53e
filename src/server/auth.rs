//! Bearer-credential extraction for handlers.
//!
//! Handlers never read user ids or roles from request bodies; the only actor
//! identity the core acts on is the one resolved here from the
//! `Authorization` header.

use super::error::ApiError;
use super::state::AppState;
use crate::directory::Identity;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Bearer token extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized("missing authorization header"))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                ApiError::unauthorized("invalid authorization format, expected 'Bearer <token>'")
            })?
            .to_string();
        if token.is_empty() {
            return Err(ApiError::unauthorized("empty bearer token"));
        }
        Ok(Self(token))
    }
}

/// The authenticated caller, resolved through the identity provider.
///
/// Use as a handler parameter to require authentication.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let bearer = BearerToken::from_request_parts(parts, state).await?;
        let identity = state
            .identity
            .resolve(&bearer.0)
            .await
            .map_err(|_| ApiError::unauthorized("invalid or expired credential"))?;
        Ok(Self(identity))
    }
}
