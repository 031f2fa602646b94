use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use tracing::warn;
use uuid::Uuid;

use super::{claims::TokenKind, jwt::JwtKeys};
use crate::error::AppError;

/// Caller authenticated with an access token.
pub struct AuthUser(pub Uuid);

/// Caller authenticated with a refresh token. Only the refresh route takes it.
pub struct RefreshUser(pub Uuid);

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            warn!("missing Authorization header");
            AppError::InvalidToken
        })?;

    header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("invalid auth scheme");
        AppError::InvalidToken
    })
}

fn authenticate<S>(parts: &Parts, state: &S, kind: TokenKind) -> Result<Uuid, AppError>
where
    JwtKeys: FromRef<S>,
{
    let keys = JwtKeys::from_ref(state);
    let token = bearer_token(parts)?;
    Ok(keys.verify_kind(token, kind)?.sub)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, TokenKind::Access).map(AuthUser)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RefreshUser
where
    S: Send + Sync,
    JwtKeys: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        authenticate(parts, state, TokenKind::Refresh).map(RefreshUser)
    }
}
