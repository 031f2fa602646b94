use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{
        dto::{AccessToken, LoginRequest, RegisterRequest, TokenPair},
        extractors::RefreshUser,
    },
    error::AppError,
    response::ApiResponse,
    state::AppState,
    store::UserStore,
    users::dto::PublicUser,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/auth/refresh", get(refresh))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<PublicUser>>, AppError> {
    let payload = payload.validate()?;

    if state.users.exists_by_username(&payload.username).await? {
        warn!(username = %payload.username, "username already registered");
        return Err(AppError::UsernameTaken);
    }

    let user = state
        .auth
        .register(&payload.username, &payload.password, &payload.full_name)
        .await?;

    Ok(Json(ApiResponse::ok(
        "User created successfully",
        PublicUser::from(user),
    )))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<TokenPair>>, AppError> {
    let payload = payload.validate()?;
    let tokens = state.auth.login(&payload.username, &payload.password).await?;
    Ok(Json(ApiResponse::ok("Login successful", tokens)))
}

#[instrument(skip(state))]
pub async fn refresh(
    State(state): State<AppState>,
    RefreshUser(user_id): RefreshUser,
) -> Result<Json<ApiResponse<AccessToken>>, AppError> {
    let token = state.auth.refresh(user_id)?;
    Ok(Json(ApiResponse::ok("Token refreshed successfully", token)))
}
