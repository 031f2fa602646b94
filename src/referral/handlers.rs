use axum::{extract::State, routing::post, Json, Router};
use tracing::{instrument, warn};

use super::{
    dto::{ExpireReferralRequest, ReferralView, VerifyReferralRequest},
    services::{generate_code, CODE_LEN},
};
use crate::{auth::extractors::AuthUser, error::AppError, response::ApiResponse, state::AppState};

pub fn referral_routes() -> Router<AppState> {
    Router::new()
        .route("/referral/generate", post(generate))
        .route("/referral/expire", post(expire))
        .route("/referral/verify", post(verify))
}

#[instrument(skip(state))]
pub async fn generate(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<ApiResponse<String>>, AppError> {
    let code = generate_code(CODE_LEN);
    let link = state.referrals.generate_link(user_id, &code);
    state.referrals.create(user_id, &code).await?;
    Ok(Json(ApiResponse::ok("Referral link generated", link)))
}

#[instrument(skip(state, payload))]
pub async fn expire(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ExpireReferralRequest>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    let payload = payload.validate()?;
    state.referrals.get_active(user_id, &payload.code).await?;
    state.referrals.expire_by_owner(user_id).await?;
    Ok(Json(ApiResponse::ok_empty("Referral link expired")))
}

#[instrument(skip(state, payload))]
pub async fn verify(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<VerifyReferralRequest>,
) -> Result<Json<ApiResponse<ReferralView>>, AppError> {
    let payload = payload.validate()?;
    if payload.referrer_user_id == user_id {
        warn!(user_id = %user_id, "self referral rejected");
        return Err(AppError::SelfReferral);
    }

    let referral = state
        .referrals
        .verify(payload.referrer_user_id, user_id, &payload.code)
        .await?;
    Ok(Json(ApiResponse::ok(
        "Referral verified",
        ReferralView::from(referral),
    )))
}
