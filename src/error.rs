//! Error taxonomy shared by the core services and its axum mapping.
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::error;

use crate::{response::ApiResponse, store::StoreError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid login details")]
    InvalidCredentials,

    #[error("Username already exists")]
    UsernameTaken,

    #[error("Unauthorized")]
    InvalidToken,

    #[error("You cannot refer yourself")]
    SelfReferral,

    #[error("You have already been referred")]
    AlreadyReferred,

    #[error("Referral link does not exist")]
    ReferralNotFound,

    #[error("Invalid request")]
    Validation(Vec<String>),

    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidCredentials | AppError::InvalidToken => StatusCode::UNAUTHORIZED,
            AppError::UsernameTaken
            | AppError::SelfReferral
            | AppError::AlreadyReferred
            | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::ReferralNotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::InvalidCredentials | AppError::InvalidToken => "unauthorized",
            AppError::UsernameTaken => "username-already-exists",
            AppError::SelfReferral => "cannot-refer-self",
            AppError::AlreadyReferred => "already-referred",
            AppError::ReferralNotFound => "referral-not-found",
            AppError::Validation(_) => "bad-request",
            AppError::Internal(_) => "internal-server-error",
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        AppError::Internal(e.into())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let AppError::Internal(e) = &self {
            // Details stay in the logs; clients get the generic message.
            error!(error = ?e, "internal error");
        }

        let errors = match &self {
            AppError::Validation(errors) => errors.clone(),
            _ => Vec::new(),
        };
        let body = ApiResponse::<()> {
            success: false,
            message: self.to_string(),
            data: None,
            error_code: Some(self.error_code()),
            errors,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let (status, json) =
            body_json(AppError::Internal(anyhow::anyhow!("connection refused to 10.0.0.3"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Internal server error");
        assert_eq!(json["errorCode"], "internal-server-error");
        assert!(json["data"].is_null());
        assert!(!json.to_string().contains("10.0.0.3"));
    }

    #[tokio::test]
    async fn validation_error_lists_problems() {
        let (status, json) =
            body_json(AppError::Validation(vec!["username is too short".into()])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["errorCode"], "bad-request");
        assert_eq!(json["errors"][0], "username is too short");
    }

    #[test]
    fn referral_errors_map_to_expected_statuses() {
        assert_eq!(AppError::ReferralNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::SelfReferral.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::AlreadyReferred.error_code(), "already-referred");
        assert_eq!(AppError::InvalidToken.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::InvalidCredentials.error_code(),
            AppError::InvalidToken.error_code()
        );
    }
}
