use axum::{extract::State, routing::get, Json, Router};
use tracing::{error, instrument};
use uuid::Uuid;

use super::{
    dto::{MeResponse, PublicUser},
    repo_types::User,
};
use crate::{
    auth::extractors::AuthUser, error::AppError, response::ApiResponse, state::AppState,
    store::UserStore,
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/balance", get(balance))
        .route("/me", get(me))
}

/// A valid token for a user that no longer exists is treated as unauthorized.
async fn load_user(state: &AppState, user_id: Uuid) -> Result<User, AppError> {
    state.users.find_by_id(user_id).await?.ok_or_else(|| {
        error!(user_id = %user_id, "user not found");
        AppError::InvalidToken
    })
}

#[instrument(skip(state))]
pub async fn balance(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<i64>>, AppError> {
    let user = load_user(&state, user_id).await?;
    Ok(Json(ApiResponse::ok("Balance fetched", user.balance)))
}

#[instrument(skip(state))]
pub async fn me(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<MeResponse>>, AppError> {
    let user = load_user(&state, user_id).await?;
    let active_referrals = state.referrals.count(user_id).await?;
    Ok(Json(ApiResponse::ok(
        "User fetched",
        MeResponse {
            user: PublicUser::from(user),
            active_referrals,
        },
    )))
}
